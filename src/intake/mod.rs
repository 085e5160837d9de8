pub mod camera;
pub mod landmarker;
pub mod page_url;

pub use camera::{CameraConstraints, CameraSource, FacingMode, StillCamera};
pub use landmarker::{HandLandmarker, JsonLinesLandmarker, ProcessLandmarker};
pub use page_url::pair_id_from_url;
