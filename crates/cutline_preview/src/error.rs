use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("invalid preview config: {0}")]
    InvalidConfig(String),

    #[error("preview loop is not running")]
    Stopped,
}

pub type Result<T> = std::result::Result<T, PreviewError>;
