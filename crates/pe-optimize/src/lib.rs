pub mod env;
pub mod orchestrators;
pub mod passes;

pub use orchestrators::{SpecializationOrchestrator, SpecializationOutcome, SpecializeOptions};
pub use passes::{InlineExpansion, Inliner, Optimizer, Walk};
