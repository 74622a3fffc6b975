use std::path::PathBuf;

/// Errors that can occur when saving or loading policy snapshots.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("no saved policy named '{0}'")]
    NotFound(String),

    #[error("failed to read policy from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse policy from {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid policy data: {0}")]
    InvalidSnapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<KeyParseError> for PersistenceError {
    fn from(err: KeyParseError) -> Self {
        PersistenceError::InvalidSnapshot(err.to_string())
    }
}

/// Errors raised while training or evaluating a model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainingError {
    #[error("training diverged at step {step} (loss = {loss})")]
    Diverged { step: usize, loss: f64 },

    #[error("network expects {expected} inputs, got {got}")]
    InputWidth { expected: usize, got: usize },
}

/// Errors that can occur when loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

/// A table key that could not be parsed from its string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyParseError {
    #[error("expected \"col,row\", got '{0}'")]
    GridPos(String),

    #[error("expected 7 binary digits, got '{0}'")]
    SnakeFeatures(String),
}
