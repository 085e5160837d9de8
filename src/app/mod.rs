pub mod overlay_app;
pub mod status;
pub mod views;

pub use overlay_app::OverlayApp;
pub use status::Status;
