use tokio::sync::{oneshot, watch};
use tracing::{error, info};

use crate::app::status::Status;
use crate::app::views::{frame_view::FrameView, View};
use crate::config::Settings;
use crate::coordinator::{Coordinator, CoordinatorBuilder, FrameReceiver};
use crate::error::AppError;

/// Window showing the composited feed and the session status.
pub struct OverlayApp {
    status_rx: watch::Receiver<Status>,
    coordinator_rx: Option<oneshot::Receiver<Coordinator>>,
    coordinator: Option<Coordinator>,
    frame_rx: Option<FrameReceiver>,
    frame_view: FrameView,
}

impl OverlayApp {
    pub fn new(builder: CoordinatorBuilder) -> Self {
        let (status_tx, status_rx) = watch::channel(Status::info("Loading images..."));
        let (coordinator_tx, coordinator_rx) = oneshot::channel();

        tokio::spawn(async move {
            match builder.start().await {
                Ok(coordinator) => {
                    status_tx.send_replace(Status::Hidden);
                    if coordinator_tx.send(coordinator).is_err() {
                        info!("Window closed before the session started.");
                    }
                }
                Err(e) => {
                    error!("Initialization failed: {}", e);
                    status_tx.send_replace(Status::error(e.status_message()));
                }
            }
        });

        Self {
            status_rx,
            coordinator_rx: Some(coordinator_rx),
            coordinator: None,
            frame_rx: None,
            frame_view: FrameView::new(),
        }
    }

    pub fn start_gui(settings: &Settings, builder: CoordinatorBuilder) -> Result<(), AppError> {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_inner_size(egui::vec2(settings.display.width, settings.display.height))
                .with_title(settings.display.title.clone()),
            ..Default::default()
        };

        eframe::run_native(
            &settings.display.title,
            options,
            Box::new(move |_cc| Ok(Box::new(OverlayApp::new(builder)))),
        )
        .map_err(|e| AppError::Display(e.to_string()))
    }

    fn poll_coordinator(&mut self) {
        let Some(rx) = self.coordinator_rx.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(coordinator) => {
                self.frame_rx = Some(coordinator.frames());
                self.coordinator = Some(coordinator);
                self.coordinator_rx = None;
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => {
                // Initialization failed; the status already says why.
                self.coordinator_rx = None;
            }
        }
    }
}

impl eframe::App for OverlayApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_coordinator();

        if let Some(frame_rx) = self.frame_rx.as_mut() {
            if frame_rx.has_changed().unwrap_or(false) {
                if let Some(frame) = frame_rx.borrow_and_update().clone() {
                    self.frame_view.update(ctx, &frame);
                }
            }
        }

        let status = self.status_rx.borrow().clone();
        if let Some(message) = status.message() {
            egui::TopBottomPanel::top("status").show(ctx, |ui| {
                if status.is_error() {
                    ui.colored_label(egui::Color32::RED, message);
                } else {
                    ui.label(message);
                }
            });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.frame_view.draw(ui);
        });

        ctx.request_repaint();
    }
}

impl Drop for OverlayApp {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.take() {
            coordinator.stop();
        }
    }
}
