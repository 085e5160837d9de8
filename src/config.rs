use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::intake::camera::{CameraConstraints, FacingMode};

pub const DEFAULT_CONFIG_FILE: &str = "palmreveal.toml";
const ENV_PREFIX: &str = "PALMREVEAL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub storage: StorageSettings,
    pub import: ImportSettings,
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub overlay: OverlaySettings,
    pub render: RenderSettings,
    pub display: DisplaySettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub path: PathBuf,
}

/// Limits applied to images before they are stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub max_file_size_mb: f32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSettings {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    /// Helper process printing landmark JSON lines, e.g. a MediaPipe script.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlaySettings {
    pub radius_scale: f32,
    pub feather_inner: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    pub frame_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub title: String,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage: StorageSettings {
                path: PathBuf::from("data"),
            },
            import: ImportSettings {
                max_width: 1920,
                max_height: 1920,
                max_file_size_mb: 10.0,
                jpeg_quality: 85,
            },
            camera: CameraSettings {
                facing_mode: FacingMode::User,
                ideal_width: 1280,
                ideal_height: 720,
                frame_rate: 30,
            },
            detection: DetectionSettings {
                max_hands: 1,
                min_detection_confidence: 0.5,
                min_tracking_confidence: 0.5,
                command: None,
            },
            overlay: OverlaySettings {
                radius_scale: 2.5,
                feather_inner: 0.7,
            },
            render: RenderSettings { frame_rate: 60 },
            display: DisplaySettings {
                title: "Palm Reveal".to_string(),
                width: 1280.0,
                height: 720.0,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Layers defaults, an optional TOML file and `PALMREVEAL__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn camera_constraints(&self) -> CameraConstraints {
        CameraConstraints {
            facing_mode: self.camera.facing_mode,
            ideal_width: self.camera.ideal_width,
            ideal_height: self.camera.ideal_height,
            frame_rate: self.camera.frame_rate,
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}
