use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Read failed at byte {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("File changed during upload: {0}")]
    FileChanged(String),

    #[error("Invalid hash window size: {0}")]
    InvalidWindowSize(usize),

    #[error("Invalid MD5 digest: {0}")]
    InvalidDigest(String),

    #[error("Checksum computation cancelled")]
    Cancelled,
}

pub type IntegrityResult<T> = Result<T, IntegrityError>;
