//! HTTP API handlers
//!
//! All routes live under `/api`. Error bodies are `{"error": "<message>"}`.

pub mod health;
pub mod predict;
pub mod search;
pub mod song_details;

pub use health::health_routes;
pub use predict::predict_routes;
pub use search::search_routes;
pub use song_details::song_details_routes;
