#[macro_use]
pub mod macros;

pub mod ast;
pub mod error;
pub mod ops;
pub mod registry;

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
