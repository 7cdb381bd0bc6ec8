//! Tree model for the partial evaluator.
//!
//! A single function is represented as a [`StmtFunctionDef`] owning its body;
//! every node owns its children via `Box`/`Vec`, so a tree can be deep-cloned
//! per specialization attempt and rewritten in place within one attempt.

mod expr;
mod ident;
mod ops;
mod stmt;
mod value;

pub use expr::*;
pub use ident::*;
pub use ops::*;
pub use stmt::*;
pub use value::*;
