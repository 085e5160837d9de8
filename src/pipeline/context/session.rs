use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, RgbaImage};
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::RenderMetrics;
use crate::common::CanvasSize;
use crate::error::AppError;
use crate::pipeline::services::compositor::{FeatherMask, FrameCompositor};
use crate::pipeline::types::HandState;
use crate::storage::{ImagePair, ImagePairStore, ImageRole};

/// Both images of a pair, decoded and ready to draw.
#[derive(Clone)]
pub struct LoadedImages {
    pub pair_id: String,
    pub background: Arc<DynamicImage>,
    pub overlay: Arc<DynamicImage>,
}

/// Fetches a pair and decodes both of its images.
///
/// Failures are logged per image; the first failing role is returned.
pub async fn load_session_images(store: &ImagePairStore, id: &str) -> Result<LoadedImages, AppError> {
    store.init().await?;
    let pair = Arc::new(store.get(id).await?);

    let (background, overlay) = futures::future::join(
        decode_in_background(pair.clone(), ImageRole::Background),
        decode_in_background(pair.clone(), ImageRole::Overlay),
    )
    .await;

    for result in [&background, &overlay] {
        if let Err(err) = result {
            error!("Pair {}: {}", id, err);
        }
    }

    let images = LoadedImages {
        pair_id: pair.id.clone(),
        background: Arc::new(background?),
        overlay: Arc::new(overlay?),
    };
    info!(
        "Loaded pair {} (background {}x{}, overlay {}x{})",
        images.pair_id,
        images.background.width(),
        images.background.height(),
        images.overlay.width(),
        images.overlay.height()
    );
    Ok(images)
}

async fn decode_in_background(pair: Arc<ImagePair>, role: ImageRole) -> Result<DynamicImage, AppError> {
    tokio::task::spawn_blocking(move || pair.decode_image(role)).await?
}

/// Render-side state of one overlay session.
///
/// Reads the latest hand state without waiting for detection.
pub struct OverlaySession {
    compositor: FrameCompositor,
    hand_rx: watch::Receiver<HandState>,
    metrics: RenderMetrics,
}

impl OverlaySession {
    pub fn new(images: LoadedImages, canvas: CanvasSize, hand_rx: watch::Receiver<HandState>) -> Self {
        Self {
            compositor: FrameCompositor::new(canvas, images.background, images.overlay),
            hand_rx,
            metrics: RenderMetrics::new(),
        }
    }

    pub fn with_mask(mut self, mask: FeatherMask) -> Self {
        self.compositor = self.compositor.with_mask(mask);
        self
    }

    pub fn canvas(&self) -> CanvasSize {
        self.compositor.canvas()
    }

    /// Composes one frame from the most recent hand state.
    pub fn render_tick(&mut self) -> RgbaImage {
        let state = *self.hand_rx.borrow_and_update();
        let started = Instant::now();
        let frame = self.compositor.render(&state);
        let elapsed = started.elapsed();

        self.metrics.record_frame(state.is_present(), elapsed);
        debug!("Rendered frame in {:?} ({:?})", elapsed, state);
        frame
    }

    pub fn metrics(&self) -> &RenderMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::PalmPosition;
    use crate::storage::NewImage;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn png(color: Rgba<u8>) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbaImage::from_pixel(8, 6, color)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn images() -> LoadedImages {
        LoadedImages {
            pair_id: "pair_1_test00000".to_string(),
            background: Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, GREEN))),
            overlay: Arc::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, WHITE))),
        }
    }

    #[tokio::test]
    async fn loads_both_images_of_a_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImagePairStore::new(dir.path());
        let id = store
            .put(NewImage::new("bg.png", png(GREEN)), NewImage::new("fg.png", png(WHITE)), None)
            .await
            .unwrap();

        let loaded = load_session_images(&store, &id).await.unwrap();
        assert_eq!(loaded.pair_id, id);
        assert_eq!(loaded.background.to_rgba8().get_pixel(0, 0), &GREEN);
        assert_eq!(loaded.overlay.to_rgba8().get_pixel(0, 0), &WHITE);
    }

    #[tokio::test]
    async fn reports_the_failing_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImagePairStore::new(dir.path());
        let id = store
            .put(NewImage::new("bg.png", png(GREEN)), NewImage::new("fg.png", b"garbage".to_vec()), None)
            .await
            .unwrap();

        let err = load_session_images(&store, &id).await.err().unwrap();
        assert!(matches!(err, AppError::ImageDecode { role: ImageRole::Overlay, .. }));
    }

    #[tokio::test]
    async fn unknown_pair_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImagePairStore::new(dir.path());
        let err = load_session_images(&store, "pair_0_missing00").await.err().unwrap();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn render_tick_follows_latest_hand_state() {
        let (hand_tx, hand_rx) = watch::channel(HandState::NoHand);
        let mut session = OverlaySession::new(images(), CanvasSize::new(40, 30), hand_rx);

        let frame = session.render_tick();
        assert!(frame.pixels().all(|px| *px == GREEN));

        hand_tx.send_replace(HandState::HandPresent(PalmPosition::new(20.0, 15.0, 10.0)));
        let frame = session.render_tick();
        assert_eq!(*frame.get_pixel(20, 15), WHITE);

        hand_tx.send_replace(HandState::NoHand);
        let frame = session.render_tick();
        assert_eq!(*frame.get_pixel(20, 15), GREEN);

        assert_eq!(session.metrics().frames_rendered(), 3);
        assert_eq!(session.metrics().frames_with_hand(), 1);
    }
}
