mod aspect_fit;
mod feather;
mod frame_compositor;

pub use aspect_fit::{aspect_fit, Placement};
pub use feather::FeatherMask;
pub use frame_compositor::FrameCompositor;
