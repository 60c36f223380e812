//! # TrackLens Common Library
//!
//! Shared code for the TrackLens crates:
//! - Common error type
//! - Configuration file loading and root folder resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
