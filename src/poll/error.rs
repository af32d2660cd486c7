use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Status request failed: {0}")]
    Source(String),

    #[error("Unexpected status reply: {0}")]
    Schema(String),

    #[error("Device task failed: {0}")]
    TaskFailed(String),

    #[error("Gave up after {attempts} consecutive failed polls: {last}")]
    TooManyErrors { attempts: u32, last: String },

    #[error("Polling cancelled")]
    Cancelled,

    #[error("Invalid status URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        PollError::Source(err.to_string())
    }
}

pub type PollResult<T> = Result<T, PollError>;
