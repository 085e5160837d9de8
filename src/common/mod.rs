pub mod frame;
pub mod landmark;

pub use frame::{CameraFrame, CanvasSize};
pub use landmark::{HandPose, Landmark, LandmarkIdx, HAND_LANDMARK_COUNT, PALM_LANDMARKS};
