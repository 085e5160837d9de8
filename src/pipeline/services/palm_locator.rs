use std::{
    future::{ready, Ready},
    task::{Context, Poll},
};

use tower::Service;

use crate::common::{CanvasSize, HandPose, Landmark};
use crate::error::AppError;
use crate::pipeline::types::{DetectionResult, HandState, PalmPosition};

pub const DEFAULT_RADIUS_SCALE: f32 = 2.5;

/// Mean of the wrist and the four finger-base landmarks, in normalized units.
pub fn compute_palm_center(pose: &HandPose) -> Landmark {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut count = 0;
    for lm in pose.palm_landmarks() {
        sum_x += lm.x;
        sum_y += lm.y;
        count += 1;
    }

    Landmark::new(sum_x / count as f32, sum_y / count as f32)
}

/// Widest palm landmark distance from `center`, enlarged by `scale`. Normalized units.
pub fn compute_palm_radius(pose: &HandPose, center: &Landmark, scale: f32) -> f32 {
    let max_distance = pose
        .palm_landmarks()
        .map(|lm| lm.distance_to(center))
        .fold(0.0f32, f32::max);

    max_distance * scale
}

/// Turns detections into pixel-space palm positions for a fixed canvas.
#[derive(Debug, Clone)]
pub struct PalmLocator {
    canvas: CanvasSize,
    radius_scale: f32,
}

impl PalmLocator {
    pub fn new(canvas: CanvasSize) -> Self {
        Self {
            canvas,
            radius_scale: DEFAULT_RADIUS_SCALE,
        }
    }

    pub fn with_radius_scale(mut self, radius_scale: f32) -> Self {
        self.radius_scale = radius_scale;
        self
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn locate(&self, result: &DetectionResult) -> HandState {
        let Some(pose) = result.first_pose() else {
            return HandState::NoHand;
        };

        let center = compute_palm_center(pose);
        let radius = compute_palm_radius(pose, &center, self.radius_scale);

        // Radius is scaled by width only; x/y pixels are assumed square.
        HandState::HandPresent(PalmPosition::new(
            center.x * self.canvas.width as f32,
            center.y * self.canvas.height as f32,
            radius * self.canvas.width as f32,
        ))
    }
}

impl Service<DetectionResult> for PalmLocator {
    type Response = HandState;
    type Error = AppError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), AppError>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, result: DetectionResult) -> Self::Future {
        ready(Ok(self.locate(&result)))
    }
}
