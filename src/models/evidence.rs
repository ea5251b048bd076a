use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceKind {
    Photo,
    Video,
}

impl EvidenceKind {
    /// Classify a MIME type, ignoring parameters such as `;codecs=vp9`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        if essence.starts_with("image/") {
            Some(EvidenceKind::Photo)
        } else if essence.starts_with("video/") {
            Some(EvidenceKind::Video)
        } else {
            None
        }
    }
}

/// Upload lifecycle of one evidence item.
///
/// Allowed moves: `Pending -> InProgress -> {Uploaded | Failed}`, progress ticks
/// within `InProgress`, and `Failed -> Pending` for a retry. The upload claim takes
/// a Failed item straight to `InProgress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadState {
    Pending,
    InProgress { percent: u8 },
    Uploaded { url: String },
    Failed { reason: String },
}

impl UploadState {
    pub fn label(&self) -> &'static str {
        match self {
            UploadState::Pending => "pending",
            UploadState::InProgress { .. } => "in_progress",
            UploadState::Uploaded { .. } => "uploaded",
            UploadState::Failed { .. } => "failed",
        }
    }

    pub fn can_transition_to(&self, next: &UploadState) -> bool {
        matches!(
            (self, next),
            (UploadState::Pending, UploadState::InProgress { .. })
                | (UploadState::InProgress { .. }, UploadState::InProgress { .. })
                | (UploadState::InProgress { .. }, UploadState::Uploaded { .. })
                | (UploadState::InProgress { .. }, UploadState::Failed { .. })
                | (UploadState::Failed { .. }, UploadState::Pending)
        )
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, UploadState::Pending)
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadState::Uploaded { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, UploadState::Failed { .. })
    }

    pub fn remote_url(&self) -> Option<&str> {
        match self {
            UploadState::Uploaded { url } => Some(url.as_str()),
            _ => None,
        }
    }

    /// Percentage for progress bars; terminal success always reads 100.
    pub fn percent(&self) -> u8 {
        match self {
            UploadState::Pending | UploadState::Failed { .. } => 0,
            UploadState::InProgress { percent } => (*percent).min(100),
            UploadState::Uploaded { .. } => 100,
        }
    }
}

/// Encoded capture output handed to the Evidence Store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidencePayload {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl EvidencePayload {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File extension used when naming the multipart part.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }
}

/// File extension for a MIME type, ignoring parameters.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.split(';').next().unwrap_or("").trim() {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "video/webm" => "webm",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

/// One captured photo or video. Serializes as metadata only; the payload stays in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: Uuid,
    #[serde(skip)]
    pub payload: Bytes,
    pub mime_type: String,
    pub kind: EvidenceKind,
    pub captured_at: DateTime<Utc>,
    pub upload_state: UploadState,
}

impl EvidenceItem {
    pub fn new(payload: EvidencePayload, kind: EvidenceKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: payload.bytes,
            mime_type: payload.mime_type,
            kind,
            captured_at: Utc::now(),
            upload_state: UploadState::Pending,
        }
    }

    pub fn with_state(&self, upload_state: UploadState) -> Self {
        Self {
            upload_state,
            ..self.clone()
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
