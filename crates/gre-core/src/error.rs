use thiserror::Error;

pub type GreResult<T> = Result<T, GreError>;

#[derive(Debug, Error)]
pub enum GreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid object id: {0:?}")]
    InvalidObjectId(String),

    #[error("invalid push refspec: {0:?}")]
    InvalidRefspec(String),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
