//! Adapters for the external hand-landmark model.
//!
//! The model runs outside this crate. It reports one JSON object per processed frame:
//!
//! ```json
//! {"hands": [{"score": 0.97, "landmarks": [{"x": 0.51, "y": 0.62, "z": 0.0}, ...]}]}
//! ```
//!
//! Each hand carries exactly 21 normalized landmarks. An `"error"` field reports a model
//! failure for that frame.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::common::{CameraFrame, HandPose, Landmark};
use crate::config::DetectionSettings;
use crate::error::AppError;
use crate::pipeline::types::DetectionResult;

const READY_SIGNAL: &str = "READY";

/// Pose-estimation collaborator: one frame in, zero or more hands out.
#[async_trait]
pub trait HandLandmarker: Send {
    async fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionResult, AppError>;
}

#[derive(Debug, Deserialize)]
struct HandJson {
    landmarks: Vec<Landmark>,
    #[serde(default = "full_confidence")]
    score: f32,
}

fn full_confidence() -> f32 {
    1.0
}

#[derive(Debug, Deserialize)]
struct DetectionJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

/// Reads detections from newline-delimited JSON, one line per frame.
///
/// Once input is exhausted every further frame reports no hands.
pub struct JsonLinesLandmarker<R> {
    lines: Lines<R>,
    max_hands: usize,
    min_detection_confidence: f32,
    exhausted: bool,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesLandmarker<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            max_hands: 1,
            min_detection_confidence: 0.5,
            exhausted: false,
        }
    }

    pub fn with_settings(mut self, settings: &DetectionSettings) -> Self {
        self.max_hands = settings.max_hands;
        self.min_detection_confidence = settings.min_detection_confidence;
        self
    }

    async fn next_detection(&mut self, frame_id: Uuid) -> Result<DetectionResult, AppError> {
        while !self.exhausted {
            let line = self
                .lines
                .next_line()
                .await
                .map_err(|err| AppError::Detection(format!("failed to read detections: {err}")))?;

            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return self.parse(frame_id, &line),
                None => {
                    info!("Landmark input exhausted, reporting no hands from now on");
                    self.exhausted = true;
                }
            }
        }
        Ok(DetectionResult::empty(frame_id))
    }

    fn parse(&self, frame_id: Uuid, line: &str) -> Result<DetectionResult, AppError> {
        let detection: DetectionJson = serde_json::from_str(line)
            .map_err(|err| AppError::Detection(format!("malformed detection line: {err}")))?;
        if let Some(error) = detection.error {
            return Err(AppError::Detection(error));
        }

        let poses = detection
            .hands
            .into_iter()
            .filter(|hand| hand.score >= self.min_detection_confidence)
            .take(self.max_hands)
            .map(|hand| HandPose::with_score(hand.landmarks, hand.score))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Frame {} reported {} hand(s)", frame_id, poses.len());
        Ok(DetectionResult::new(frame_id, poses))
    }
}

impl JsonLinesLandmarker<BufReader<File>> {
    /// Replays detections recorded to a file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|err| {
            AppError::Detection(format!("cannot open landmarks {}: {}", path.display(), err))
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> HandLandmarker for JsonLinesLandmarker<R> {
    async fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionResult, AppError> {
        self.next_detection(frame.frame_id()).await
    }
}

/// Model options sent to the helper as its first stdin line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct HelperOptions {
    max_num_hands: usize,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
}

impl From<&DetectionSettings> for HelperOptions {
    fn from(settings: &DetectionSettings) -> Self {
        Self {
            max_num_hands: settings.max_hands,
            min_detection_confidence: settings.min_detection_confidence,
            min_tracking_confidence: settings.min_tracking_confidence,
        }
    }
}

/// Sends the model options and waits for the helper's `READY` line.
async fn handshake<W, R>(
    stdin: &mut W,
    stdout: &mut R,
    settings: &DetectionSettings,
) -> Result<(), AppError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let mut options = serde_json::to_string(&HelperOptions::from(settings))
        .map_err(|err| AppError::Detection(format!("cannot encode helper options: {err}")))?;
    options.push('\n');

    let send = async {
        stdin.write_all(options.as_bytes()).await?;
        stdin.flush().await
    };
    send.await
        .map_err(|err| AppError::Detection(format!("failed to configure helper: {err}")))?;

    let mut ready = String::new();
    stdout
        .read_line(&mut ready)
        .await
        .map_err(|err| AppError::Detection(format!("helper failed before ready: {err}")))?;
    if ready.trim() != READY_SIGNAL {
        return Err(AppError::Detection(format!(
            "helper did not signal ready, got: {}",
            ready.trim()
        )));
    }
    Ok(())
}

/// Runs the landmark model as a helper process.
///
/// The helper first reads one JSON options line
/// (`{"maxNumHands":..,"minDetectionConfidence":..,"minTrackingConfidence":..}`) and prints
/// `READY` once loaded. Each frame then goes to its stdin as a JSON header line
/// (`{"width":..,"height":..}`) followed by `width × height × 3` RGB bytes, and the helper
/// answers with one detection line per frame.
pub struct ProcessLandmarker {
    child: Child,
    stdin: ChildStdin,
    output: JsonLinesLandmarker<BufReader<ChildStdout>>,
}

impl ProcessLandmarker {
    pub async fn spawn(command: &str, settings: &DetectionSettings) -> Result<Self, AppError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AppError::Detection("empty detector command".to_string()))?;

        info!("Starting hand landmark helper: {}", command);
        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AppError::Detection(format!("failed to start {program}: {err}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Detection("helper stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Detection("helper stdout unavailable".to_string()))?;

        let mut reader = BufReader::new(stdout);
        handshake(&mut stdin, &mut reader, settings).await?;
        info!("Hand landmark helper ready");

        Ok(Self {
            child,
            stdin,
            output: JsonLinesLandmarker::new(reader).with_settings(settings),
        })
    }
}

#[async_trait]
impl HandLandmarker for ProcessLandmarker {
    async fn detect(&mut self, frame: &CameraFrame) -> Result<DetectionResult, AppError> {
        let rgb = frame.image().to_rgb8();
        let header = format!("{{\"width\":{},\"height\":{}}}\n", rgb.width(), rgb.height());

        let write = async {
            self.stdin.write_all(header.as_bytes()).await?;
            self.stdin.write_all(rgb.as_raw()).await?;
            self.stdin.flush().await
        };
        if let Err(err) = write.await {
            warn!("Hand landmark helper rejected frame: {}", err);
            if let Ok(Some(status)) = self.child.try_wait() {
                return Err(AppError::Detection(format!("helper exited with {status}")));
            }
            return Err(AppError::Detection(format!("failed to send frame: {err}")));
        }

        self.output.detect(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::HAND_LANDMARK_COUNT;
    use chrono::Utc;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;
    use std::sync::Arc;

    fn frame() -> CameraFrame {
        CameraFrame::new(
            Arc::new(DynamicImage::ImageRgb8(RgbImage::new(4, 4))),
            Utc::now(),
        )
    }

    fn hand_json(x: f32, score: f32) -> String {
        let points: Vec<String> = (0..HAND_LANDMARK_COUNT)
            .map(|_| format!("{{\"x\":{x},\"y\":0.5}}"))
            .collect();
        format!("{{\"score\":{score},\"landmarks\":[{}]}}", points.join(","))
    }

    fn landmarker(input: String) -> JsonLinesLandmarker<Cursor<Vec<u8>>> {
        JsonLinesLandmarker::new(Cursor::new(input.into_bytes()))
    }

    #[tokio::test]
    async fn reads_one_detection_per_frame() {
        let input = format!(
            "{{\"hands\":[{}]}}\n\n{{\"hands\":[]}}\n",
            hand_json(0.25, 0.9)
        );
        let mut landmarker = landmarker(input);
        let frame = frame();

        let first = landmarker.detect(&frame).await.unwrap();
        assert_eq!(first.frame_id, frame.frame_id());
        assert_eq!(first.poses.len(), 1);
        assert_eq!(first.poses[0].landmarks()[0].x, 0.25);

        let second = landmarker.detect(&frame).await.unwrap();
        assert!(second.poses.is_empty());

        let after_end = landmarker.detect(&frame).await.unwrap();
        assert!(after_end.poses.is_empty());
    }

    #[tokio::test]
    async fn drops_low_confidence_and_extra_hands() {
        let input = format!(
            "{{\"hands\":[{},{},{}]}}\n",
            hand_json(0.1, 0.2),
            hand_json(0.2, 0.8),
            hand_json(0.3, 0.9)
        );
        let mut landmarker = landmarker(input);
        let result = landmarker.detect(&frame()).await.unwrap();
        assert_eq!(result.poses.len(), 1);
        assert_eq!(result.poses[0].landmarks()[0].x, 0.2);
    }

    #[tokio::test]
    async fn model_errors_and_bad_lines_surface() {
        let mut landmarker = landmarker("{\"error\":\"model not loaded\"}\nnot json\n".to_string());
        let err = landmarker.detect(&frame()).await.unwrap_err();
        assert!(matches!(err, AppError::Detection(ref msg) if msg == "model not loaded"));
        assert!(landmarker.detect(&frame()).await.is_err());
    }

    #[tokio::test]
    async fn handshake_sends_model_options_before_ready() {
        let settings = DetectionSettings {
            max_hands: 2,
            min_detection_confidence: 0.25,
            min_tracking_confidence: 0.75,
            command: None,
        };
        let (mut stdin, helper_stdin) = tokio::io::duplex(1024);
        let mut stdout = Cursor::new(b"READY\n".to_vec());

        handshake(&mut stdin, &mut stdout, &settings).await.unwrap();

        let mut line = String::new();
        BufReader::new(helper_stdin).read_line(&mut line).await.unwrap();
        let options: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(options["maxNumHands"], 2);
        assert_eq!(options["minDetectionConfidence"], 0.25);
        assert_eq!(options["minTrackingConfidence"], 0.75);
    }

    #[tokio::test]
    async fn handshake_requires_ready_line() {
        let (mut stdin, _helper_stdin) = tokio::io::duplex(1024);
        let mut stdout = Cursor::new(b"loading model\n".to_vec());
        let err = handshake(&mut stdin, &mut stdout, &crate::config::Settings::default().detection)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Detection(ref msg) if msg.contains("loading model")));
    }

    #[tokio::test]
    async fn short_hands_are_rejected() {
        let mut landmarker =
            landmarker("{\"hands\":[{\"landmarks\":[{\"x\":0.1,\"y\":0.1}]}]}\n".to_string());
        assert!(matches!(
            landmarker.detect(&frame()).await,
            Err(AppError::Detection(_))
        ));
    }
}
