use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::{
    config::Settings,
    error::{StoreError, UploadError},
    models::{EvidenceItem, EvidenceKind, UploadState},
    services::evidence_store::SharedEvidenceStore,
};

/// Transfers one item's payload to remote storage. One request per call; retrying
/// is the coordinator's business.
#[async_trait]
pub trait EvidenceUploader: Send + Sync {
    async fn upload(&self, item: &EvidenceItem) -> Result<String, UploadError>;
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Items in flight at once during bulk operations. 1 keeps uploads strictly sequential.
    pub concurrency: usize,
    pub progress_tick: Duration,
    pub progress_step: u8,
    pub progress_ceiling: u8,
    pub max_image_bytes: u64,
    pub max_video_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            progress_tick: Duration::from_millis(200),
            progress_step: 10,
            progress_ceiling: 90,
            max_image_bytes: 25 * 1024 * 1024,
            max_video_bytes: 50 * 1024 * 1024,
        }
    }
}

impl UploadConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.upload_concurrency.max(1) as usize,
            progress_tick: settings.upload_progress_tick(),
            max_image_bytes: settings.max_image_bytes,
            max_video_bytes: settings.max_video_bytes,
            ..Self::default()
        }
    }

    fn limit_for(&self, kind: EvidenceKind) -> u64 {
        match kind {
            EvidenceKind::Photo => self.max_image_bytes,
            EvidenceKind::Video => self.max_video_bytes,
        }
    }
}

/// In-flight bookkeeping for one upload. The percentage is simulated: it only
/// gives the user something to watch and says nothing about bytes on the wire.
struct UploadTask {
    item_id: Uuid,
    total_bytes: usize,
    started_at: Instant,
    percent: u8,
}

impl UploadTask {
    fn new(item: &EvidenceItem) -> Self {
        Self {
            item_id: item.id,
            total_bytes: item.size(),
            started_at: Instant::now(),
            percent: 0,
        }
    }

    fn advance(&mut self, step: u8, ceiling: u8) -> u8 {
        self.percent = self.percent.saturating_add(step).min(ceiling);
        self.percent
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSummary {
    pub results: Vec<(Uuid, Result<String, String>)>,
}

impl UploadSummary {
    pub fn uploaded(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Drives items through `Pending -> InProgress -> {Uploaded | Failed}` against the
/// shared Evidence Store. Item failures stay item-scoped.
pub struct UploadCoordinator {
    store: SharedEvidenceStore,
    uploader: Arc<dyn EvidenceUploader>,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        store: SharedEvidenceStore,
        uploader: Arc<dyn EvidenceUploader>,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            uploader,
            config,
        }
    }

    pub fn store(&self) -> &SharedEvidenceStore {
        &self.store
    }

    /// Upload a single item. Pending and Failed items are claimed atomically; an
    /// item that is already uploaded returns its URL without another request.
    pub async fn upload_one(&self, id: Uuid) -> Result<String, UploadError> {
        let item = match self.store.begin_upload(id) {
            Ok(item) => item,
            Err(StoreError::UnknownItem(id)) => return Err(UploadError::UnknownItem(id)),
            Err(StoreError::InvalidTransition { .. }) => {
                // Lost the claim: report what the winner left behind.
                return match self.store.get(id).map(|item| item.upload_state) {
                    Some(UploadState::Uploaded { url }) => Ok(url),
                    Some(_) => Err(UploadError::AlreadyInProgress(id)),
                    None => Err(UploadError::UnknownItem(id)),
                };
            }
        };

        let mut task = UploadTask::new(&item);
        tracing::info!(item_id = %id, size = task.total_bytes, "upload started");

        let limit = self.config.limit_for(item.kind);
        let result = if item.size() as u64 > limit {
            Err(UploadError::TooLarge {
                kind: item.kind,
                size: item.size(),
                limit,
            })
        } else {
            self.transfer(&item, &mut task).await
        };

        self.finish(&task, &result);
        result
    }

    /// Upload every Pending item in capture order.
    pub async fn upload_all(&self) -> UploadSummary {
        let ids = self.store.pending_ids();
        self.run_batch(ids).await
    }

    /// Retry every Failed item.
    pub async fn retry_failed(&self) -> UploadSummary {
        let ids = self.store.failed_ids();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "retrying failed uploads");
        }
        self.run_batch(ids).await
    }

    async fn run_batch(&self, ids: Vec<Uuid>) -> UploadSummary {
        let results = stream::iter(ids)
            .map(|id| async move {
                let result = self.upload_one(id).await.map_err(|e| e.to_string());
                (id, result)
            })
            .buffered(self.config.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;

        let summary = UploadSummary { results };
        if !summary.is_empty() {
            tracing::info!(
                uploaded = summary.uploaded(),
                failed = summary.failed(),
                "upload batch finished"
            );
        }
        summary
    }

    /// Run the request while ticking simulated progress into the store.
    async fn transfer(&self, item: &EvidenceItem, task: &mut UploadTask) -> Result<String, UploadError> {
        let upload = self.uploader.upload(item);
        tokio::pin!(upload);

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.config.progress_tick,
            self.config.progress_tick,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticking = true;

        loop {
            tokio::select! {
                result = &mut upload => return result,
                _ = ticker.tick(), if ticking => {
                    let percent = task.advance(self.config.progress_step, self.config.progress_ceiling);
                    if self
                        .store
                        .set_upload_state(task.item_id, UploadState::InProgress { percent })
                        .is_err()
                    {
                        ticking = false;
                    }
                }
            }
        }
    }

    fn finish(&self, task: &UploadTask, result: &Result<String, UploadError>) {
        let id = task.item_id;
        let next = match result {
            Ok(url) => UploadState::Uploaded { url: url.clone() },
            Err(e) => UploadState::Failed {
                reason: e.user_message(),
            },
        };

        match self.store.set_upload_state(id, next) {
            Ok(()) => match result {
                Ok(url) => tracing::info!(
                    item_id = %id,
                    url = %url,
                    elapsed_ms = task.started_at.elapsed().as_millis() as u64,
                    "upload finished"
                ),
                Err(e) => tracing::warn!(item_id = %id, error = %e, "upload failed"),
            },
            Err(StoreError::UnknownItem(_)) => {
                tracing::info!(item_id = %id, "item removed during upload, result dropped");
            }
            Err(e) => tracing::warn!(item_id = %id, error = %e, "could not record upload result"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EvidencePayload;
    use crate::services::evidence_store::EvidenceStore;
    use crate::services::submission_gate::SubmissionGate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted uploader: per-item queue of outcomes, default success.
    #[derive(Default)]
    struct ScriptedUploader {
        script: Mutex<HashMap<Uuid, Vec<Result<String, UploadError>>>>,
        calls: Mutex<Vec<Uuid>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
    }

    impl ScriptedUploader {
        fn with_latency(latency: Duration) -> Self {
            Self {
                latency,
                ..Default::default()
            }
        }

        fn fail_once(&self, id: Uuid, err: UploadError) {
            self.script.lock().unwrap().entry(id).or_default().push(Err(err));
        }

        fn calls(&self) -> Vec<Uuid> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EvidenceUploader for ScriptedUploader {
        async fn upload(&self, item: &EvidenceItem) -> Result<String, UploadError> {
            self.calls.lock().unwrap().push(item.id);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.latency).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let scripted = {
                let mut script = self.script.lock().unwrap();
                script.get_mut(&item.id).and_then(|queue| {
                    if queue.is_empty() {
                        None
                    } else {
                        Some(queue.remove(0))
                    }
                })
            };
            scripted.unwrap_or_else(|| Ok(format!("https://cdn.test/{}", item.id)))
        }
    }

    fn photo() -> EvidencePayload {
        EvidencePayload::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg")
    }

    fn coordinator(uploader: Arc<ScriptedUploader>, config: UploadConfig) -> (UploadCoordinator, SharedEvidenceStore) {
        let store = EvidenceStore::shared();
        (UploadCoordinator::new(store.clone(), uploader, config), store)
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_all_is_sequential_in_capture_order() {
        let uploader = Arc::new(ScriptedUploader::with_latency(Duration::from_millis(300)));
        let (coordinator, store) = coordinator(uploader.clone(), UploadConfig::default());
        let ids: Vec<Uuid> = (0..3).map(|_| store.add(photo(), EvidenceKind::Photo).id).collect();

        let summary = coordinator.upload_all().await;

        assert_eq!(uploader.calls(), ids);
        assert_eq!(uploader.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(summary.uploaded(), 3);
        let result_ids: Vec<Uuid> = summary.results.iter().map(|(id, _)| *id).collect();
        assert_eq!(result_ids, ids);
        assert!(store.all().iter().all(|item| item.upload_state.is_uploaded()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_tunable_and_order_preserved() {
        let uploader = Arc::new(ScriptedUploader::with_latency(Duration::from_millis(300)));
        let config = UploadConfig {
            concurrency: 3,
            ..UploadConfig::default()
        };
        let (coordinator, store) = coordinator(uploader.clone(), config);
        let ids: Vec<Uuid> = (0..3).map(|_| store.add(photo(), EvidenceKind::Photo).id).collect();

        let summary = coordinator.upload_all().await;

        assert_eq!(uploader.max_in_flight.load(Ordering::SeqCst), 3);
        let result_ids: Vec<Uuid> = summary.results.iter().map(|(id, _)| *id).collect();
        assert_eq!(result_ids, ids);
        let stored: Vec<Uuid> = store.all().iter().map(|item| item.id).collect();
        assert_eq!(stored, ids);
    }

    #[tokio::test]
    async fn test_partial_failure_then_retry() {
        let uploader = Arc::new(ScriptedUploader::default());
        let (coordinator, store) = coordinator(uploader.clone(), UploadConfig::default());
        let first = store.add(photo(), EvidenceKind::Photo).id;
        let second = store.add(photo(), EvidenceKind::Photo).id;
        uploader.fail_once(second, UploadError::Network("connection reset".into()));

        let summary = coordinator.upload_all().await;
        assert_eq!((summary.uploaded(), summary.failed()), (1, 1));
        assert!(store.get(first).unwrap().upload_state.is_uploaded());
        assert!(store.get(second).unwrap().upload_state.is_failed());

        let retry = coordinator.retry_failed().await;
        assert_eq!(retry.uploaded(), 1);
        assert!(store.get(second).unwrap().upload_state.is_uploaded());
        assert_eq!(uploader.calls(), vec![first, second, second]);
    }

    #[tokio::test]
    async fn test_middle_failure_leaves_neighbours_uploaded() {
        let uploader = Arc::new(ScriptedUploader::default());
        let (coordinator, store) = coordinator(uploader.clone(), UploadConfig::default());
        let gate = SubmissionGate::new(store.clone());
        let ids: Vec<Uuid> = (0..3).map(|_| store.add(photo(), EvidenceKind::Photo).id).collect();
        uploader.fail_once(ids[1], UploadError::Storage("bucket offline".into()));

        let summary = coordinator.upload_all().await;
        assert_eq!((summary.uploaded(), summary.failed()), (2, 1));
        assert_eq!(uploader.calls(), ids);

        let first_state = store.get(ids[0]).unwrap().upload_state;
        assert_eq!(first_state, UploadState::Uploaded { url: format!("https://cdn.test/{}", ids[0]) });
        assert!(store.get(ids[1]).unwrap().upload_state.is_failed());
        assert!(store.get(ids[2]).unwrap().upload_state.is_uploaded());
        assert!(!gate.is_open());

        let retry = coordinator.retry_failed().await;
        assert_eq!((retry.uploaded(), retry.failed()), (1, 0));
        assert_eq!(store.get(ids[0]).unwrap().upload_state, first_state);
        assert!(store.all().iter().all(|item| item.upload_state.is_uploaded()));
        assert!(gate.is_open());
        assert_eq!(uploader.calls(), vec![ids[0], ids[1], ids[2], ids[1]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_caller_does_not_duplicate_upload() {
        let uploader = Arc::new(ScriptedUploader::with_latency(Duration::from_secs(1)));
        let (coordinator, store) = coordinator(uploader.clone(), UploadConfig::default());
        let coordinator = Arc::new(coordinator);
        let id = store.add(photo(), EvidenceKind::Photo).id;
        uploader.fail_once(id, UploadError::Network("timeout".into()));
        assert!(coordinator.upload_one(id).await.is_err());

        let running = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.upload_one(id).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(coordinator.upload_one(id).await, Err(UploadError::AlreadyInProgress(id)));

        let url = running.await.unwrap().unwrap();
        assert_eq!(coordinator.upload_one(id).await, Ok(url));
        assert_eq!(uploader.calls(), vec![id, id]);
    }

    #[tokio::test]
    async fn test_uploaded_item_is_not_reuploaded() {
        let uploader = Arc::new(ScriptedUploader::default());
        let (coordinator, store) = coordinator(uploader.clone(), UploadConfig::default());
        let id = store.add(photo(), EvidenceKind::Photo).id;

        let url = coordinator.upload_one(id).await.unwrap();
        assert_eq!(coordinator.upload_one(id).await.unwrap(), url);
        assert_eq!(uploader.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let uploader = Arc::new(ScriptedUploader::default());
        let (coordinator, _store) = coordinator(uploader, UploadConfig::default());
        let id = Uuid::new_v4();
        assert_eq!(coordinator.upload_one(id).await, Err(UploadError::UnknownItem(id)));
    }

    #[tokio::test]
    async fn test_oversized_item_fails_without_request() {
        let uploader = Arc::new(ScriptedUploader::default());
        let config = UploadConfig {
            max_image_bytes: 2,
            ..UploadConfig::default()
        };
        let (coordinator, store) = coordinator(uploader.clone(), config);
        let id = store.add(photo(), EvidenceKind::Photo).id;

        let err = coordinator.upload_one(id).await.unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { size: 4, limit: 2, .. }));
        assert!(uploader.calls().is_empty());
        assert!(store.get(id).unwrap().upload_state.is_failed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_progress_is_capped() {
        let uploader = Arc::new(ScriptedUploader::with_latency(Duration::from_secs(5)));
        let (coordinator, store) = coordinator(uploader, UploadConfig::default());
        let coordinator = Arc::new(coordinator);
        let id = store.add(photo(), EvidenceKind::Photo).id;

        let running = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.upload_one(id).await }
        });

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.get(id).unwrap().upload_state, UploadState::InProgress { percent: 50 });

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(store.get(id).unwrap().upload_state, UploadState::InProgress { percent: 90 });

        running.await.unwrap().unwrap();
        assert_eq!(store.get(id).unwrap().upload_state.percent(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_during_upload_drops_result() {
        let uploader = Arc::new(ScriptedUploader::with_latency(Duration::from_secs(1)));
        let (coordinator, store) = coordinator(uploader, UploadConfig::default());
        let coordinator = Arc::new(coordinator);
        let keep = store.add(photo(), EvidenceKind::Photo).id;
        let gone = store.add(photo(), EvidenceKind::Photo).id;

        let running = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.upload_one(gone).await }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(store.remove(gone));

        assert!(running.await.unwrap().is_ok());
        assert_eq!(store.count(), 1);
        assert_eq!(store.all()[0].id, keep);
        assert!(store.all()[0].upload_state.is_pending());
    }
}
