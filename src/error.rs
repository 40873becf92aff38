use thiserror::Error;

/// Error taxonomy for the dashboard client.
///
/// HTTP non-2xx responses are deliberately NOT errors: the transport returns
/// them as structured [`crate::api::ApiResponse`] values for the caller to
/// inspect. Only transport breakage, exhausted required probes, bad input
/// and store failures surface here.
#[derive(Debug, Error)]
pub enum DashError {
    #[error("invalid server url '{input}': {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("invalid input: {0}")]
    Input(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("sign-in failed: {0}")]
    Auth(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DashError>;
