//! HTTP API handlers for hskk-scoring
//!
//! Thin shell over the scoring engine: health, task listing, assessment and
//! acoustic-only scoring.

pub mod acoustic;
pub mod assessment;
pub mod health;
pub mod tasks;

pub use acoustic::acoustic_routes;
pub use assessment::assessment_routes;
pub use health::health_routes;
pub use tasks::task_routes;
