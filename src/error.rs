//! Error types for KurmaNav

use thiserror::Error;

/// KurmaNav error type
#[derive(Error, Debug)]
pub enum KurmaError {
    #[error("Connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command transport error: {0}")]
    Transport(String),

    #[error("Game state error: {0}")]
    Game(String),
}

impl From<toml::de::Error> for KurmaError {
    fn from(e: toml::de::Error) -> Self {
        KurmaError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for KurmaError {
    fn from(e: serde_json::Error) -> Self {
        KurmaError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KurmaError>;
