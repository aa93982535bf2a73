use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Bad or missing caller input.
    #[error("{0}")]
    Validation(String),

    /// The upstream service rejected our credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A bounded wait elapsed.
    #[error("{0}")]
    Timeout(String),

    /// Network failure, non-2xx answer or a payload we could not interpret.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The upstream job itself reported failure. Carries the upstream error
    /// value untouched.
    #[error("Generation failed: {0}")]
    JobFailed(Value),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Error::Upstream(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout("Request timeout".to_string())
        } else {
            Error::Upstream(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Upstream(format!("invalid JSON: {err}"))
    }
}
