pub mod inliner;
pub mod optimizer;

pub use inliner::{InlineExpansion, Inliner};
pub use optimizer::{Optimizer, Walk};
