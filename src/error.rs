//! Error types for the wellness engine

use thiserror::Error;

/// Errors that can surface from the engine.
///
/// Degenerate inputs (empty windows, zero ranges, unparsable targets) are
/// not errors: the analyzers fall back to documented defaults or "no data"
/// results. What remains is storage failures and malformed parameters.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
