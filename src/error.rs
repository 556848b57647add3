use thiserror::Error;

/// Failure kinds for the watch engine.
///
/// `Config` is fatal at startup. `Transport` and `MalformedResponse` are
/// per-cycle: the failed cycle skips its merge and the next scheduled cycle
/// acts as the retry.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("configuration missing or invalid: {0}")]
    Config(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<octocrab::Error> for WatchError {
    fn from(err: octocrab::Error) -> Self {
        // octocrab reports non-2xx statuses and undecodable bodies through the
        // same error type; both are handled identically downstream.
        WatchError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
