//! Error types for the decision engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid tab id: {0:?}")]
    InvalidTabId(String),

    #[error("failed to read preferences: {0}")]
    PrefsIo(#[from] std::io::Error),

    #[error("failed to parse preferences file: {0}")]
    PrefsToml(#[from] toml::de::Error),

    #[error("invalid preferences: {0}")]
    InvalidPrefs(String),
}
