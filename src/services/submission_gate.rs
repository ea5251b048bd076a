use serde::Serialize;

use crate::{
    models::{EvidenceItem, UploadState},
    services::evidence_store::SharedEvidenceStore,
};

/// A report may be submitted only when there is evidence and all of it is uploaded.
pub fn can_submit(items: &[EvidenceItem]) -> bool {
    !items.is_empty() && items.iter().all(|item| item.upload_state.is_uploaded())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GateStatus {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub can_submit: bool,
}

impl GateStatus {
    pub fn from_items(items: &[EvidenceItem]) -> Self {
        let mut status = GateStatus {
            total: items.len(),
            ..Default::default()
        };
        for item in items {
            match item.upload_state {
                UploadState::Pending => status.pending += 1,
                UploadState::InProgress { .. } => status.in_progress += 1,
                UploadState::Uploaded { .. } => status.uploaded += 1,
                UploadState::Failed { .. } => status.failed += 1,
            }
        }
        status.can_submit = can_submit(items);
        status
    }
}

/// Readiness check bound to a live store. Never caches: every query reads the
/// current committed snapshot.
#[derive(Clone)]
pub struct SubmissionGate {
    store: SharedEvidenceStore,
}

impl SubmissionGate {
    pub fn new(store: SharedEvidenceStore) -> Self {
        Self { store }
    }

    pub fn is_open(&self) -> bool {
        can_submit(&self.store.all())
    }

    pub fn status(&self) -> GateStatus {
        GateStatus::from_items(&self.store.all())
    }

    /// Suspend until the gate opens.
    pub async fn wait_until_open(&self) {
        let mut changes = self.store.subscribe();
        loop {
            if self.is_open() {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}
