//! Camera and microphone acquisition.
//!
//! Platform capture APIs sit behind [`MediaDevice`] / [`MediaTrack`]; this module
//! owns what happens on top of them: exclusive stream handles that are released
//! exactly once, mirror-corrected JPEG snapshots and duration-capped recordings.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use image::{buffer::ConvertBuffer, codecs::jpeg::JpegEncoder, imageops, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{config::Settings, error::DeviceError, models::EvidencePayload};

pub const PHOTO_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear camera, pointed at the scene.
    Environment,
    /// Front camera.
    User,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Environment => f.write_str("environment"),
            Facing::User => f.write_str("user"),
        }
    }
}

/// Opens camera (and optionally microphone) tracks.
#[async_trait]
pub trait MediaDevice: Send + Sync {
    async fn open(&self, facing: Facing, with_audio: bool) -> Result<Arc<dyn MediaTrack>, DeviceError>;
}

/// A live capture track.
pub trait MediaTrack: Send + Sync {
    fn label(&self) -> String;

    /// The frame currently rendered in the preview, as displayed.
    fn current_frame(&self) -> Option<RgbaImage>;

    /// Container type produced by the encoder.
    fn video_mime_type(&self) -> String {
        "video/webm".to_string()
    }

    /// Begin emitting encoded video chunks.
    fn start_encoder(&self) -> Result<mpsc::Receiver<Bytes>, DeviceError>;

    fn stop_encoder(&self);

    /// Stop every underlying device track.
    fn stop(&self);
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub photo_quality: u8,
    pub recording_cap: Duration,
    /// The preview shows a mirrored image; snapshots undo the mirroring.
    pub preview_mirrored: bool,
    pub with_audio: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            photo_quality: 85,
            recording_cap: Duration::from_secs(20),
            preview_mirrored: true,
            with_audio: true,
        }
    }
}

impl CaptureConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            photo_quality: settings.photo_quality,
            recording_cap: settings.recording_cap(),
            ..Self::default()
        }
    }
}

/// Exclusive handle on an opened device. Released exactly once, explicitly via
/// [`MediaStream::release`] or on drop.
pub struct MediaStream {
    id: Uuid,
    facing: Facing,
    track: Arc<dyn MediaTrack>,
    released: AtomicBool,
}

impl MediaStream {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Stop all tracks. Returns false when the stream was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.track.stop();
        tracing::debug!(stream_id = %self.id, track = %self.track.label(), "media stream released");
        true
    }

    fn live_track(&self) -> Result<&Arc<dyn MediaTrack>, DeviceError> {
        if self.is_released() {
            Err(DeviceError::StreamReleased)
        } else {
            Ok(&self.track)
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        if !self.is_released() {
            tracing::warn!(stream_id = %self.id, "media stream dropped without release");
            self.release();
        }
    }
}

pub struct MediaCapture {
    device: Arc<dyn MediaDevice>,
    config: CaptureConfig,
}

impl MediaCapture {
    pub fn new(device: Arc<dyn MediaDevice>, config: CaptureConfig) -> Self {
        Self { device, config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub async fn acquire_stream(&self, facing: Facing) -> Result<MediaStream, DeviceError> {
        match self.device.open(facing, self.config.with_audio).await {
            Ok(track) => {
                let stream = MediaStream {
                    id: Uuid::new_v4(),
                    facing,
                    track,
                    released: AtomicBool::new(false),
                };
                tracing::info!(stream_id = %stream.id, facing = %facing, "media stream acquired");
                Ok(stream)
            }
            Err(e) => {
                tracing::warn!(facing = %facing, error = %e, "failed to acquire media stream");
                Err(e)
            }
        }
    }

    /// Snapshot the rendered frame, undoing the preview mirror, as JPEG.
    pub fn capture_photo(&self, stream: &MediaStream) -> Result<EvidencePayload, DeviceError> {
        let rendered = stream
            .live_track()?
            .current_frame()
            .ok_or(DeviceError::NoFrame)?;

        let frame = if self.config.preview_mirrored {
            imageops::flip_horizontal(&rendered)
        } else {
            rendered
        };

        let bytes = encode_jpeg(&frame, self.config.photo_quality)?;
        tracing::debug!(
            stream_id = %stream.id,
            width = frame.width(),
            height = frame.height(),
            size = bytes.len(),
            "photo captured"
        );
        Ok(EvidencePayload::new(bytes, PHOTO_MIME_TYPE))
    }

    /// Start recording. The recorder finalizes on its own once the cap is reached.
    pub fn start_recording(&self, stream: &MediaStream) -> Result<RecordingHandle, DeviceError> {
        let track = stream.live_track()?.clone();
        let mut chunks = track.start_encoder()?;
        let cap = self.config.recording_cap;
        let mime_type = track.video_mime_type();
        let stream_id = stream.id;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let deadline = started + cap;
            let mut buffer = BytesMut::new();

            let auto_stopped = loop {
                tokio::select! {
                    biased;
                    _ = tokio::time::sleep_until(deadline) => break true,
                    _ = &mut stop_rx => break false,
                    chunk = chunks.recv() => match chunk {
                        Some(chunk) => buffer.extend_from_slice(&chunk),
                        None => break false,
                    },
                }
            };
            track.stop_encoder();

            let duration = started.elapsed().min(cap);
            tracing::info!(
                stream_id = %stream_id,
                duration_ms = duration.as_millis() as u64,
                size = buffer.len(),
                auto_stopped,
                "recording finalized"
            );

            VideoRecording {
                payload: EvidencePayload::new(buffer.freeze(), mime_type),
                duration,
                auto_stopped,
            }
        });

        tracing::debug!(stream_id = %stream_id, cap_ms = cap.as_millis() as u64, "recording started");
        Ok(RecordingHandle {
            stop_tx: Some(stop_tx),
            task,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VideoRecording {
    pub payload: EvidencePayload,
    pub duration: Duration,
    /// True when the cap ended the recording rather than the user.
    pub auto_stopped: bool,
}

pub struct RecordingHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<VideoRecording>,
}

impl RecordingHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop (if still running) and wait for the finalized video.
    pub async fn stop(mut self) -> Result<VideoRecording, DeviceError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        (&mut self.task)
            .await
            .map_err(|e| DeviceError::Unknown(format!("recorder task failed: {}", e)))
    }
}

pub fn encode_jpeg(frame: &RgbaImage, quality: u8) -> Result<Vec<u8>, DeviceError> {
    let rgb: RgbImage = frame.convert();
    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|e| DeviceError::Encoding(e.to_string()))?;
    Ok(out)
}
