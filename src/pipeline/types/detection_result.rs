use uuid::Uuid;

use crate::common::HandPose;

/// Output of one landmark-model invocation: zero or more hands.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub frame_id: Uuid,
    pub poses: Vec<HandPose>,
}

impl DetectionResult {
    pub fn new(frame_id: Uuid, poses: Vec<HandPose>) -> Self {
        Self { frame_id, poses }
    }

    pub fn empty(frame_id: Uuid) -> Self {
        Self::new(frame_id, Vec::new())
    }

    pub fn first_pose(&self) -> Option<&HandPose> {
        self.poses.first()
    }
}
