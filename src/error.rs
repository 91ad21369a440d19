// src/error.rs

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that stop the session. Per-frame conditions (missing detections,
/// unusable landmarks, evidence loss) are logged and counted instead.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid boundary: {0}")]
    BoundaryInvalid(String),

    #[error("Evidence write failed: {0}")]
    EvidenceWrite(String),

    #[error("Evidence recorder is no longer running")]
    RecorderClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl WatchError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    pub fn boundary<S: Into<String>>(msg: S) -> Self {
        Self::BoundaryInvalid(msg.into())
    }

    pub fn evidence<S: Into<String>>(msg: S) -> Self {
        Self::EvidenceWrite(msg.into())
    }
}
