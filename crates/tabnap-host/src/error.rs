//! Error types for the browser boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("platform query unavailable: {0}")]
    Unavailable(String),

    #[error("host io error: {0}")]
    Io(#[from] std::io::Error),
}
