use thiserror::Error;

use crate::storage::ImageRole;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("Camera unavailable: {0}")]
    Camera(String),
    #[error("Missing image pair id parameter")]
    MissingParameter,
    #[error("Image pair not found: {0}")]
    NotFound(String),
    #[error("Failed to load {role} image: {source}")]
    ImageDecode {
        role: ImageRole,
        #[source]
        source: image::ImageError,
    },
    #[error("Cannot import {name}: {reason}")]
    InvalidImage { name: String, reason: String },
    #[error("Storage Error: {0}")]
    Storage(#[from] StorageError),
    #[error("Detection Error: {0}")]
    Detection(String),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Display Error: {0}")]
    Display(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    /// The single line shown to the user when initialization fails.
    pub fn status_message(&self) -> String {
        match self {
            AppError::PermissionDenied(_) => {
                format!("Initialization failed: {self}. Please allow camera access.")
            }
            _ => format!("Initialization failed: {self}"),
        }
    }
}

// Storage Error Type
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to (de)serialize pair document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Pair document is corrupt: {0}")]
    Corrupt(String),
    #[error("A pair with id {0} already exists")]
    DuplicateId(String),
    #[error("Invalid data URI: {0}")]
    InvalidDataUri(String),
}

impl StorageError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_asks_for_camera_access() {
        let message = AppError::PermissionDenied("NotAllowedError".to_string()).status_message();
        assert!(message.starts_with("Initialization failed"));
        assert!(message.ends_with("Please allow camera access."));
    }

    #[test]
    fn storage_errors_convert_into_app_errors() {
        let err: AppError = StorageError::DuplicateId("pair_1_abc".to_string()).into();
        assert!(matches!(err, AppError::Storage(StorageError::DuplicateId(_))));
        assert_eq!(
            err.status_message(),
            "Initialization failed: Storage Error: A pair with id pair_1_abc already exists"
        );
    }
}
