//! The reporting session: capture, staging, upload and the final submission.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::Settings,
    error::{DeviceError, SubmissionError},
    models::{EvidenceItem, EvidenceKind, EvidencePayload, LocationSample, ReportCode, ReportForm, ReportPayload},
    services::{
        evidence_store::SharedEvidenceStore,
        location_service::LocationConfig,
        media::{CaptureConfig, Facing, MediaCapture, MediaDevice, MediaStream, RecordingHandle},
        session_cache::{self, SessionCache},
        submission_gate::{can_submit, GateStatus, SubmissionGate},
        upload_coordinator::{EvidenceUploader, UploadConfig, UploadCoordinator, UploadSummary},
    },
    utils::validate_report_fields,
};

/// Sends a finished report and returns its public code.
#[async_trait]
pub trait ReportApi: Send + Sync {
    async fn submit(&self, payload: &ReportPayload) -> Result<ReportCode, SubmissionError>;
}

/// Client pipeline tunables derived from [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub capture: CaptureConfig,
    pub upload: UploadConfig,
    pub location: LocationConfig,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            capture: CaptureConfig::from_settings(settings),
            upload: UploadConfig::from_settings(settings),
            location: LocationConfig::from_settings(settings),
        }
    }
}

/// Assemble the submission body. Evidence URLs follow capture order.
pub fn build_payload(
    form: &ReportForm,
    items: &[EvidenceItem],
    location: Option<&LocationSample>,
) -> Result<ReportPayload, SubmissionError> {
    if items.is_empty() {
        return Err(SubmissionError::NotReady("no evidence has been captured".to_string()));
    }
    if !can_submit(items) {
        let status = GateStatus::from_items(items);
        return Err(SubmissionError::NotReady(format!(
            "{} of {} evidence files are uploaded",
            status.uploaded, status.total
        )));
    }

    let address = location
        .map(|sample| sample.address.trim())
        .filter(|address| !address.is_empty())
        .ok_or_else(|| SubmissionError::NotReady("location has not been detected".to_string()))?;

    validate_report_fields(&form.offense_id, &form.description).map_err(SubmissionError::Validation)?;

    let evidence_urls = items
        .iter()
        .filter_map(|item| item.upload_state.remote_url().map(str::to_string))
        .collect();

    Ok(ReportPayload {
        offense_id: form.offense_id.trim().to_string(),
        description: form.description.trim().to_string(),
        address: address.to_string(),
        anonymous: form.anonymous,
        evidence_urls,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    Capturing,
    Staged,
    AllUploaded,
    Submitting,
    Submitted { code: ReportCode },
    SubmissionFailed { reason: String },
}

/// States the flow holds explicitly. Staged and AllUploaded are derived from the store.
#[derive(Debug, Clone)]
enum Phase {
    Open,
    Capturing,
    Submitting,
    Submitted(ReportCode),
    Failed(String),
}

pub struct ReportFlow {
    store: SharedEvidenceStore,
    capture: MediaCapture,
    uploads: UploadCoordinator,
    gate: SubmissionGate,
    api: Arc<dyn ReportApi>,
    cache: Arc<dyn SessionCache>,
    phase: Mutex<Phase>,
}

impl ReportFlow {
    pub fn new(
        store: SharedEvidenceStore,
        device: Arc<dyn MediaDevice>,
        uploader: Arc<dyn EvidenceUploader>,
        api: Arc<dyn ReportApi>,
        cache: Arc<dyn SessionCache>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            capture: MediaCapture::new(device, config.capture.clone()),
            uploads: UploadCoordinator::new(store.clone(), uploader, config.upload.clone()),
            gate: SubmissionGate::new(store.clone()),
            store,
            api,
            cache,
            phase: Mutex::new(Phase::Open),
        }
    }

    pub fn store(&self) -> &SharedEvidenceStore {
        &self.store
    }

    pub fn gate(&self) -> &SubmissionGate {
        &self.gate
    }

    pub fn state(&self) -> FlowState {
        match &*self.phase() {
            Phase::Capturing => FlowState::Capturing,
            Phase::Submitting => FlowState::Submitting,
            Phase::Submitted(code) => FlowState::Submitted { code: code.clone() },
            Phase::Failed(reason) => FlowState::SubmissionFailed {
                reason: reason.clone(),
            },
            Phase::Open if self.store.is_empty() => FlowState::Idle,
            Phase::Open if self.gate.is_open() => FlowState::AllUploaded,
            Phase::Open => FlowState::Staged,
        }
    }

    /// Open the camera. The returned stream must be handed back to [`ReportFlow::end_capture`].
    pub async fn begin_capture(&self, facing: Facing) -> Result<MediaStream, DeviceError> {
        let stream = self.capture.acquire_stream(facing).await?;
        *self.phase() = Phase::Capturing;
        Ok(stream)
    }

    /// Close the capture surface. Uploads already in flight keep running.
    pub fn end_capture(&self, stream: MediaStream) {
        stream.release();
        let mut phase = self.phase();
        if matches!(*phase, Phase::Capturing) {
            *phase = Phase::Open;
        }
    }

    pub fn capture_photo(&self, stream: &MediaStream) -> Result<EvidenceItem, DeviceError> {
        let payload = self.capture.capture_photo(stream)?;
        Ok(self.stage(payload, EvidenceKind::Photo))
    }

    pub fn start_recording(&self, stream: &MediaStream) -> Result<RecordingHandle, DeviceError> {
        self.capture.start_recording(stream)
    }

    pub async fn finish_recording(&self, recording: RecordingHandle) -> Result<EvidenceItem, DeviceError> {
        let video = recording.stop().await?;
        if video.payload.is_empty() {
            return Err(DeviceError::Encoding("recording produced no data".to_string()));
        }
        Ok(self.stage(video.payload, EvidenceKind::Video))
    }

    /// Add a capture to the session and refresh the session cache.
    pub fn stage(&self, payload: EvidencePayload, kind: EvidenceKind) -> EvidenceItem {
        {
            let mut phase = self.phase();
            if matches!(*phase, Phase::Submitted(_)) {
                *phase = Phase::Open;
            }
        }
        let item = self.store.add(payload, kind);
        self.store.persist_to(self.cache.as_ref());
        item
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.store.remove(id);
        if removed {
            self.store.persist_to(self.cache.as_ref());
        }
        removed
    }

    pub async fn upload_all(&self) -> UploadSummary {
        let summary = self.uploads.upload_all().await;
        self.store.persist_to(self.cache.as_ref());
        summary
    }

    pub async fn retry_failed(&self) -> UploadSummary {
        let summary = self.uploads.retry_failed().await;
        self.store.persist_to(self.cache.as_ref());
        summary
    }

    /// Submit the report. Succeeds only when every captured item is uploaded; on
    /// failure the evidence stays staged for another attempt.
    pub async fn submit(
        &self,
        form: &ReportForm,
        location: Option<&LocationSample>,
    ) -> Result<ReportCode, SubmissionError> {
        let remembered = match location {
            Some(_) => None,
            None => session_cache::load_location(self.cache.as_ref()).map(|address| LocationSample::new(address, None)),
        };
        let location = location.or(remembered.as_ref());

        let snapshot = self.store.all();
        let payload = build_payload(form, &snapshot, location)?;
        let submitted: Vec<Uuid> = snapshot.iter().map(|item| item.id).collect();

        {
            let mut phase = self.phase();
            if matches!(*phase, Phase::Submitting) {
                return Err(SubmissionError::NotReady("a submission is already in progress".to_string()));
            }
            *phase = Phase::Submitting;
        }
        tracing::info!(evidence = payload.evidence_urls.len(), "submitting report");

        match self.api.submit(&payload).await {
            Ok(code) => {
                // Only the evidence that went out with the report; captures staged
                // while the request was in flight stay for the next one.
                for id in &submitted {
                    self.store.remove(*id);
                }
                let remaining = self.store.count();
                if remaining == 0 {
                    session_cache::clear_report_session(self.cache.as_ref());
                } else {
                    self.store.persist_to(self.cache.as_ref());
                }
                *self.phase() = Phase::Submitted(code.clone());
                tracing::info!(code = %code, remaining, "report submitted");
                Ok(code)
            }
            Err(e) => {
                *self.phase() = Phase::Failed(e.user_message());
                tracing::warn!(error = %e, "report submission failed, evidence kept");
                Err(e)
            }
        }
    }

    /// Dismiss a failed submission and return to the staged evidence.
    pub fn acknowledge_failure(&self) {
        let mut phase = self.phase();
        if matches!(*phase, Phase::Failed(_)) {
            *phase = Phase::Open;
        }
    }

    /// Abandon the session.
    pub fn cancel(&self) {
        self.store.clear();
        session_cache::clear_report_session(self.cache.as_ref());
        *self.phase() = Phase::Open;
        tracing::info!("reporting session cancelled");
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
