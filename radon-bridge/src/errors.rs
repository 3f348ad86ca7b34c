use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Enumerating the environment itself failed (e.g. `ps` could not run).
    /// Distinct from "nothing found", which is not an error at all.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout(err.to_string())
        } else {
            BridgeError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::CommandFailed(err.to_string())
    }
}
