use thiserror::Error;

#[derive(Debug, Error)]
pub enum FalbatchError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Reference images are required by edit model '{0}'")]
    MissingReferenceImages(String),
    #[error("Remote call error: {0}")]
    RemoteCall(String),
    #[error("Response resolution error: {0}")]
    Resolution(String),
    #[error("Fetch error: {0}")]
    Fetch(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FalbatchError>;
