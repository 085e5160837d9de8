mod detection_result;
mod hand_state;
mod palm_position;

pub use detection_result::DetectionResult;
pub use hand_state::HandState;
pub use palm_position::PalmPosition;
