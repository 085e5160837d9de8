use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

use crate::{
    common::CanvasSize,
    config::Settings,
    error::AppError,
    intake::{CameraSource, HandLandmarker},
    pipeline::{
        load_session_images, services::FeatherMask, DetectionResult, HandState, LoadedImages,
        OverlaySession, PalmLocator,
    },
    storage::ImagePairStore,
};

pub type FrameReceiver = watch::Receiver<Option<Arc<RgbaImage>>>;

/// Runs the detection and render tasks of one overlay session.
pub struct Coordinator {
    detection_task: JoinHandle<()>,
    render_task: JoinHandle<()>,
    cancel_token: CancellationToken,
    frame_rx: FrameReceiver,
    hand_rx: watch::Receiver<HandState>,
    canvas: CanvasSize,
}

impl Coordinator {
    fn spawn(settings: &Settings, prepared: Prepared) -> Self {
        let cancel_token = CancellationToken::new();
        let (hand_tx, hand_rx) = watch::channel(HandState::NoHand);
        let (frame_tx, frame_rx) = watch::channel(None);

        let locator =
            PalmLocator::new(prepared.canvas).with_radius_scale(settings.overlay.radius_scale);
        let session = OverlaySession::new(prepared.images, prepared.canvas, hand_rx.clone())
            .with_mask(FeatherMask::new(settings.overlay.feather_inner));

        let detection_task = Self::start_detection_task(
            prepared.camera,
            prepared.landmarker,
            locator,
            hand_tx,
            cancel_token.clone(),
        );
        let render_task = Self::start_render_task(
            session,
            settings.render.frame_rate,
            frame_tx,
            cancel_token.clone(),
        );

        Self {
            detection_task,
            render_task,
            cancel_token,
            frame_rx,
            hand_rx,
            canvas: prepared.canvas,
        }
    }

    fn start_detection_task(
        mut camera: Box<dyn CameraSource>,
        mut landmarker: Box<dyn HandLandmarker>,
        mut locator: PalmLocator,
        hand_tx: watch::Sender<HandState>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    frame = camera.next_frame() => frame,
                };
                let Some(frame) = frame else {
                    info!("Camera stream ended, detection stopped.");
                    break;
                };

                let detection = tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    detection = landmarker.detect(&frame) => detection,
                };
                let state = locate(&mut locator, detection).await;

                let previous = hand_tx.send_replace(state);
                if previous.is_present() != state.is_present() {
                    debug!("Hand state changed: {:?}", state);
                }
            }
        })
    }

    fn start_render_task(
        mut session: OverlaySession,
        frame_rate: u32,
        frame_tx: watch::Sender<Option<Arc<RgbaImage>>>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let frame = session.render_tick();
                        frame_tx.send_replace(Some(Arc::new(frame)));
                    }
                }
            }
            info!(
                "Render loop stopped after {} frames.",
                session.metrics().frames_rendered()
            );
        })
    }

    /// Latest composited frame, `None` until the first tick.
    pub fn frames(&self) -> FrameReceiver {
        self.frame_rx.clone()
    }

    pub fn hand_state(&self) -> watch::Receiver<HandState> {
        self.hand_rx.clone()
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
        self.detection_task.abort();
        self.render_task.abort();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Maps one detection to a hand state. Failed detections count as no hand.
async fn locate(
    locator: &mut PalmLocator,
    detection: Result<DetectionResult, AppError>,
) -> HandState {
    let result = match detection {
        Ok(result) => result,
        Err(e) => {
            warn!("Hand detection failed: {}", e);
            return HandState::NoHand;
        }
    };

    match ServiceExt::<DetectionResult>::ready(locator).await {
        Ok(service) => service.call(result).await.unwrap_or_default(),
        Err(_) => HandState::NoHand,
    }
}

/// Everything initialization produces before the tasks start.
struct Prepared {
    images: LoadedImages,
    canvas: CanvasSize,
    camera: Box<dyn CameraSource>,
    landmarker: Box<dyn HandLandmarker>,
}

pub struct CoordinatorBuilder {
    settings: Settings,
    store: Option<Arc<ImagePairStore>>,
    pair_id: Option<String>,
    camera: Option<Box<dyn CameraSource>>,
    landmarker: Option<Box<dyn HandLandmarker>>,
}

impl CoordinatorBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store: None,
            pair_id: None,
            camera: None,
            landmarker: None,
        }
    }

    pub fn store(mut self, store: Arc<ImagePairStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn pair_id(mut self, pair_id: impl Into<String>) -> Self {
        self.pair_id = Some(pair_id.into());
        self
    }

    pub fn camera(mut self, camera: Box<dyn CameraSource>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn landmarker(mut self, landmarker: Box<dyn HandLandmarker>) -> Self {
        self.landmarker = Some(landmarker);
        self
    }

    // Adjusts the render rate, this will override the configuration.
    pub fn render_frame_rate(mut self, frame_rate: u32) -> Self {
        self.settings.render.frame_rate = frame_rate;
        self
    }

    /// Initializes the session and starts both tasks.
    ///
    /// Any initialization failure is terminal and returned as-is.
    pub async fn start(self) -> Result<Coordinator, AppError> {
        let settings = self.settings.clone();
        let prepared = self.prepare().await?;
        info!(
            "Session for pair {} ready on {}x{} canvas",
            prepared.images.pair_id, prepared.canvas.width, prepared.canvas.height
        );
        Ok(Coordinator::spawn(&settings, prepared))
    }

    /// Initializes, composes the first camera frame and returns it.
    pub async fn render_once(self) -> Result<RgbaImage, AppError> {
        let settings = self.settings.clone();
        let mut prepared = self.prepare().await?;

        let frame = prepared
            .camera
            .next_frame()
            .await
            .ok_or_else(|| AppError::Camera("stream ended before the first frame".to_string()))?;
        let detection = prepared.landmarker.detect(&frame).await;

        let mut locator =
            PalmLocator::new(prepared.canvas).with_radius_scale(settings.overlay.radius_scale);
        let state = locate(&mut locator, detection).await;

        let (_hand_tx, hand_rx) = watch::channel(state);
        let mut session = OverlaySession::new(prepared.images, prepared.canvas, hand_rx)
            .with_mask(FeatherMask::new(settings.overlay.feather_inner));
        Ok(session.render_tick())
    }

    async fn prepare(self) -> Result<Prepared, AppError> {
        let pair_id = self.pair_id.ok_or(AppError::MissingParameter)?;
        let store = self
            .store
            .ok_or_else(|| AppError::Display("image pair store not set".to_string()))?;
        let mut camera = self
            .camera
            .ok_or_else(|| AppError::Camera("camera not set".to_string()))?;
        let landmarker = self
            .landmarker
            .ok_or_else(|| AppError::Detection("hand landmarker not set".to_string()))?;

        // Images load while the camera opens; readiness is awaited exactly once.
        let (ready_tx, ready_rx) = oneshot::channel();
        let loader = tokio::spawn(async move {
            let _ = ready_tx.send(load_session_images(&store, &pair_id).await);
        });

        let constraints = self.settings.camera_constraints();
        let opened = camera.open(&constraints).await;

        let images = match ready_rx.await {
            Ok(images) => images?,
            Err(_) => {
                loader.await?;
                return Err(AppError::Display("image loader stopped without a result".to_string()));
            }
        };
        let canvas = opened?;

        Ok(Prepared {
            images,
            canvas,
            camera,
            landmarker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CameraFrame, HandPose, Landmark, HAND_LANDMARK_COUNT};
    use crate::intake::{CameraConstraints, StillCamera};
    use crate::storage::NewImage;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, Rgba};
    use std::io::Cursor;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    struct DeniedCamera;

    #[async_trait]
    impl CameraSource for DeniedCamera {
        async fn open(&mut self, _constraints: &CameraConstraints) -> Result<CanvasSize, AppError> {
            Err(AppError::PermissionDenied("NotAllowedError".to_string()))
        }

        async fn next_frame(&mut self) -> Option<CameraFrame> {
            None
        }
    }

    /// Reports a centered hand on every frame.
    struct CenteredHand;

    #[async_trait]
    impl HandLandmarker for CenteredHand {
        async fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionResult, AppError> {
            let mut landmarks = vec![Landmark::new(0.5, 0.5); HAND_LANDMARK_COUNT];
            landmarks[0] = Landmark::new(0.5, 0.6);
            let pose = HandPose::new(landmarks)?;
            Ok(DetectionResult::new(frame.frame_id(), vec![pose]))
        }
    }

    struct NoHands;

    #[async_trait]
    impl HandLandmarker for NoHands {
        async fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionResult, AppError> {
            Ok(DetectionResult::empty(frame.frame_id()))
        }
    }

    fn png(color: Rgba<u8>) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::RgbaImage::from_pixel(16, 9, color)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn camera() -> Box<dyn CameraSource> {
        Box::new(StillCamera::new(DynamicImage::ImageRgba8(image::RgbaImage::new(160, 90))))
    }

    async fn store_with_pair() -> (tempfile::TempDir, Arc<ImagePairStore>, String) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ImagePairStore::new(dir.path()));
        let id = store
            .put(NewImage::new("bg.png", png(RED)), NewImage::new("fg.png", png(BLUE)), None)
            .await
            .unwrap();
        (dir, store, id)
    }

    #[tokio::test]
    async fn missing_pair_id_is_terminal() {
        let (_dir, store, _id) = store_with_pair().await;
        let result = CoordinatorBuilder::new(Settings::default())
            .store(store)
            .camera(camera())
            .landmarker(Box::new(NoHands))
            .start()
            .await;
        assert!(matches!(result, Err(AppError::MissingParameter)));
    }

    #[tokio::test]
    async fn camera_denial_is_terminal() {
        let (_dir, store, id) = store_with_pair().await;
        let result = CoordinatorBuilder::new(Settings::default())
            .store(store)
            .pair_id(id)
            .camera(Box::new(DeniedCamera))
            .landmarker(Box::new(NoHands))
            .start()
            .await;
        assert!(matches!(result, Err(AppError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn image_errors_win_over_camera_errors() {
        let (_dir, store, _id) = store_with_pair().await;
        let result = CoordinatorBuilder::new(Settings::default())
            .store(store)
            .pair_id("pair_0_unknown00")
            .camera(Box::new(DeniedCamera))
            .landmarker(Box::new(NoHands))
            .start()
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn render_once_reveals_overlay_at_palm() {
        let (_dir, store, id) = store_with_pair().await;
        let frame = CoordinatorBuilder::new(Settings::default())
            .store(store)
            .pair_id(id)
            .camera(camera())
            .landmarker(Box::new(CenteredHand))
            .render_once()
            .await
            .unwrap();

        assert_eq!(frame.dimensions(), (160, 90));
        assert_eq!(*frame.get_pixel(80, 46), BLUE);
        assert_eq!(*frame.get_pixel(2, 2), RED);
    }

    #[tokio::test]
    async fn running_session_publishes_frames_until_stopped() {
        let (_dir, store, id) = store_with_pair().await;
        let coordinator = CoordinatorBuilder::new(Settings::default())
            .store(store)
            .pair_id(id)
            .camera(camera())
            .landmarker(Box::new(CenteredHand))
            .render_frame_rate(200)
            .start()
            .await
            .unwrap();
        assert_eq!(coordinator.canvas(), CanvasSize::new(160, 90));

        let mut hand = coordinator.hand_state();
        hand.wait_for(|state| state.is_present()).await.unwrap();

        let mut frames = coordinator.frames();
        let frame = frames
            .wait_for(|frame| {
                frame
                    .as_ref()
                    .is_some_and(|frame| *frame.get_pixel(80, 46) == BLUE)
            })
            .await
            .unwrap()
            .clone()
            .unwrap();
        assert_eq!(*frame.get_pixel(2, 2), RED);

        coordinator.stop();
    }
}
