use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Device returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Device response carried no session id")]
    MissingSessionId,

    #[error("Unexpected response shape: {0}")]
    Schema(String),

    #[error("Device rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Invalid device URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.to_string())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
