pub mod compositor;
pub mod palm_locator;

pub use compositor::{aspect_fit, FeatherMask, FrameCompositor, Placement};
pub use palm_locator::{compute_palm_center, compute_palm_radius, PalmLocator};
