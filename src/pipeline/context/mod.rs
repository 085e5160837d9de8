pub mod metrics;
pub mod session;

pub use metrics::RenderMetrics;
pub use session::{load_session_images, LoadedImages, OverlaySession};
