use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::info;

use crate::common::{CameraFrame, CanvasSize};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

/// Requested stream parameters. Sources treat sizes as hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

/// Live video collaborator.
#[async_trait]
pub trait CameraSource: Send {
    /// Starts the stream and reports the frame size the canvas should adopt.
    async fn open(&mut self, constraints: &CameraConstraints) -> Result<CanvasSize, AppError>;

    /// Next frame, or `None` once the stream has ended.
    async fn next_frame(&mut self) -> Option<CameraFrame>;
}

/// Replays one still image as a video stream.
pub struct StillCamera {
    image: Arc<DynamicImage>,
    ticker: Option<Interval>,
    remaining: Option<usize>,
}

impl StillCamera {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
            ticker: None,
            remaining: None,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| AppError::Camera(format!("cannot read {}: {}", path.display(), err)))?;
        let image = image::load_from_memory(&bytes)
            .map_err(|err| AppError::Camera(format!("cannot decode {}: {}", path.display(), err)))?;
        Ok(Self::new(image))
    }

    /// Ends the stream after `frames` frames.
    pub fn with_frame_limit(mut self, frames: usize) -> Self {
        self.remaining = Some(frames);
        self
    }
}

#[async_trait]
impl CameraSource for StillCamera {
    async fn open(&mut self, constraints: &CameraConstraints) -> Result<CanvasSize, AppError> {
        let period = Duration::from_secs_f64(1.0 / constraints.frame_rate.max(1) as f64);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);

        let size = CanvasSize::new(self.image.width(), self.image.height());
        info!(
            "Still camera opened at {}x{} ({:?} facing, {} fps)",
            size.width, size.height, constraints.facing_mode, constraints.frame_rate
        );
        Ok(size)
    }

    async fn next_frame(&mut self) -> Option<CameraFrame> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }

        self.ticker.as_mut()?.tick().await;
        Some(CameraFrame::new(self.image.clone(), Utc::now()))
    }
}
