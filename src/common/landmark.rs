//! Hand landmarks as reported by the external pose-estimation model.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const HAND_LANDMARK_COUNT: usize = 21;

/// Landmark indices in the 21-point hand model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist = 0,
    ThumbCmc = 1,
    ThumbMcp = 2,
    ThumbIp = 3,
    ThumbTip = 4,
    IndexFingerMcp = 5,
    IndexFingerPip = 6,
    IndexFingerDip = 7,
    IndexFingerTip = 8,
    MiddleFingerMcp = 9,
    MiddleFingerPip = 10,
    MiddleFingerDip = 11,
    MiddleFingerTip = 12,
    RingFingerMcp = 13,
    RingFingerPip = 14,
    RingFingerDip = 15,
    RingFingerTip = 16,
    PinkyMcp = 17,
    PinkyPip = 18,
    PinkyDip = 19,
    PinkyTip = 20,
}

/// The wrist and the four finger bases, which outline the palm.
pub const PALM_LANDMARKS: [LandmarkIdx; 5] = [
    LandmarkIdx::Wrist,
    LandmarkIdx::IndexFingerMcp,
    LandmarkIdx::MiddleFingerMcp,
    LandmarkIdx::RingFingerMcp,
    LandmarkIdx::PinkyMcp,
];

/// A keypoint normalized to the frame: `x` and `y` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn distance_to(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// One detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandPose {
    landmarks: Vec<Landmark>,
    score: f32,
}

impl HandPose {
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self, AppError> {
        Self::with_score(landmarks, 1.0)
    }

    pub fn with_score(landmarks: Vec<Landmark>, score: f32) -> Result<Self, AppError> {
        if landmarks.len() != HAND_LANDMARK_COUNT {
            return Err(AppError::Detection(format!(
                "expected {} hand landmarks, got {}",
                HAND_LANDMARK_COUNT,
                landmarks.len()
            )));
        }
        Ok(Self { landmarks, score })
    }

    pub fn landmark(&self, idx: LandmarkIdx) -> Landmark {
        self.landmarks[idx as usize]
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn palm_landmarks(&self) -> impl Iterator<Item = Landmark> + '_ {
        PALM_LANDMARKS.iter().map(|idx| self.landmark(*idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_incomplete_hands() {
        let result = HandPose::new(vec![Landmark::default(); 20]);
        assert!(matches!(result, Err(AppError::Detection(_))));
    }

    #[test]
    fn palm_landmarks_pick_wrist_and_finger_bases() {
        let landmarks = (0..HAND_LANDMARK_COUNT)
            .map(|i| Landmark::new(i as f32, 0.0))
            .collect();
        let pose = HandPose::new(landmarks).unwrap();
        let xs: Vec<f32> = pose.palm_landmarks().map(|lm| lm.x).collect();
        assert_eq!(xs, vec![0.0, 5.0, 9.0, 13.0, 17.0]);
    }

    #[test]
    fn depth_defaults_to_zero_when_absent() {
        let lm: Landmark = serde_json::from_str(r#"{"x":0.25,"y":0.5}"#).unwrap();
        assert_eq!(lm, Landmark::new(0.25, 0.5));
    }
}
