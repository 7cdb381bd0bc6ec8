use std::result;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A construct the rewriter does not model. Partial specialization is
    /// worse than refusing to specialize, so these abort the whole call.
    #[error("Unsupported construct: {0}")]
    Unsupported(String),
    #[error("Generic error: {0}")]
    Generic(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported(message.into())
    }
}

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}
