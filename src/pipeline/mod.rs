pub mod context;
pub mod services;
pub mod types;

pub use context::{load_session_images, LoadedImages, OverlaySession, RenderMetrics};
pub use services::{FrameCompositor, PalmLocator};
pub use types::{DetectionResult, HandState, PalmPosition};
