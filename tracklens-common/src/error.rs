//! Common error types for TrackLens

use thiserror::Error;

/// Common result type for TrackLens operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the TrackLens crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}
