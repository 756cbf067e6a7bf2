use rusqlite;
use std::env;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProofGateError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] env::VarError),
    #[error("Transport error: {0}")]
    TransportError(String),
    #[error("Remote returned HTTP {status}: {body}")]
    RemoteStatus { status: u16, body: String },
    #[error("Failed to initialize database: {0}")]
    DatabaseInitializationError(String),
    #[error("Path error: {0}")]
    PathError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Contradiction detected: {0}")]
    Contradiction(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ProofGateError {
    /// True for failures of the network path itself, as opposed to a remote
    /// that answered with something we could not accept.
    pub fn is_transport(&self) -> bool {
        matches!(self, ProofGateError::TransportError(_))
    }
}

impl From<ureq::Error> for ProofGateError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, response) => ProofGateError::RemoteStatus {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(t) => ProofGateError::TransportError(t.to_string()),
        }
    }
}
