use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse settings: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
