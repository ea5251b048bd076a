use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{
    error::StoreError,
    models::{EvidenceItem, EvidenceKind, EvidencePayload, UploadState},
    services::session_cache::{self, SessionCache},
};

pub type SharedEvidenceStore = Arc<EvidenceStore>;

fn is_claimable(state: &UploadState) -> bool {
    state.is_pending() || state.is_failed()
}

/// Captured-but-not-yet-submitted evidence for one reporting session.
///
/// The collection is an immutable snapshot swapped atomically on every mutation.
/// Each mutation is computed from the current snapshot and an item id only, so
/// upload completions can interleave with user add/remove without locks, and
/// readers never observe a half-applied write.
pub struct EvidenceStore {
    items: ArcSwap<Vec<EvidenceItem>>,
    version: watch::Sender<u64>,
}

impl Default for EvidenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EvidenceStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            items: ArcSwap::from_pointee(Vec::new()),
            version,
        }
    }

    pub fn shared() -> SharedEvidenceStore {
        Arc::new(Self::new())
    }

    /// Stage a fresh capture at the end of the session, in Pending state.
    pub fn add(&self, payload: EvidencePayload, kind: EvidenceKind) -> EvidenceItem {
        let item = EvidenceItem::new(payload, kind);
        self.items.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(item.clone());
            next
        });
        tracing::debug!(item_id = %item.id, kind = ?kind, size = item.size(), "evidence staged");
        self.notify();
        item
    }

    /// Remove by id. Returns whether anything was removed; absent ids are a no-op.
    pub fn remove(&self, id: Uuid) -> bool {
        if !self.items.load().iter().any(|item| item.id == id) {
            return false;
        }
        let previous = self.items.rcu(|current| {
            current
                .iter()
                .filter(|item| item.id != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        let removed = previous.iter().any(|item| item.id == id);
        if removed {
            tracing::debug!(item_id = %id, "evidence removed");
            self.notify();
        }
        removed
    }

    /// Move one item to `state`. Unknown ids and illegal transitions are logged and
    /// reported, never panicked on: an upload callback may race a user removal.
    pub fn set_upload_state(&self, id: Uuid, state: UploadState) -> Result<(), StoreError> {
        let previous = self.items.rcu(|current| {
            current
                .iter()
                .map(|item| {
                    if item.id == id && item.upload_state.can_transition_to(&state) {
                        item.with_state(state.clone())
                    } else {
                        item.clone()
                    }
                })
                .collect::<Vec<_>>()
        });

        let outcome = match previous.iter().find(|item| item.id == id) {
            None => Err(StoreError::UnknownItem(id)),
            Some(item) if !item.upload_state.can_transition_to(&state) => {
                Err(StoreError::InvalidTransition {
                    id,
                    from: item.upload_state.label(),
                    to: state.label(),
                })
            }
            Some(_) => Ok(()),
        };

        match &outcome {
            Ok(()) => self.notify(),
            Err(e) => tracing::warn!(item_id = %id, error = %e, "ignored evidence state update"),
        }
        outcome
    }

    /// Atomically claim an item for upload: Pending or Failed -> InProgress(0).
    /// Two callers racing on the same item cannot both succeed.
    pub fn begin_upload(&self, id: Uuid) -> Result<EvidenceItem, StoreError> {
        let started = UploadState::InProgress { percent: 0 };
        let previous = self.items.rcu(|current| {
            current
                .iter()
                .map(|item| {
                    if item.id == id && is_claimable(&item.upload_state) {
                        item.with_state(started.clone())
                    } else {
                        item.clone()
                    }
                })
                .collect::<Vec<_>>()
        });

        match previous.iter().find(|item| item.id == id) {
            None => Err(StoreError::UnknownItem(id)),
            Some(item) if !is_claimable(&item.upload_state) => Err(StoreError::InvalidTransition {
                id,
                from: item.upload_state.label(),
                to: started.label(),
            }),
            Some(item) => {
                self.notify();
                Ok(item.with_state(started))
            }
        }
    }

    pub fn clear(&self) {
        self.items.store(Arc::new(Vec::new()));
        self.notify();
    }

    pub fn count(&self) -> usize {
        self.items.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.load().is_empty()
    }

    /// Committed snapshot in capture order.
    pub fn all(&self) -> Arc<Vec<EvidenceItem>> {
        self.items.load_full()
    }

    pub fn get(&self, id: Uuid) -> Option<EvidenceItem> {
        self.items.load().iter().find(|item| item.id == id).cloned()
    }

    pub fn ids_where<F>(&self, predicate: F) -> Vec<Uuid>
    where
        F: Fn(&UploadState) -> bool,
    {
        self.items
            .load()
            .iter()
            .filter(|item| predicate(&item.upload_state))
            .map(|item| item.id)
            .collect()
    }

    pub fn pending_ids(&self) -> Vec<Uuid> {
        self.ids_where(UploadState::is_pending)
    }

    pub fn failed_ids(&self) -> Vec<Uuid> {
        self.ids_where(UploadState::is_failed)
    }

    /// Change notifications; the value is a monotonically increasing version.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn persist_to(&self, cache: &dyn SessionCache) {
        session_cache::save_evidence(cache, &self.all());
    }

    /// Re-stage items from the session cache. Only uploaded items survive: anything
    /// else lost its payload with the page and has to be captured again.
    pub fn restore_from(&self, cache: &dyn SessionCache) -> usize {
        let cached = session_cache::load_evidence(cache);
        let total = cached.len();
        let restorable: Vec<EvidenceItem> = cached
            .into_iter()
            .filter(|item| item.upload_state.is_uploaded())
            .collect();

        if restorable.is_empty() {
            if total > 0 {
                tracing::info!(dropped = total, "no uploaded evidence to restore from session cache");
            }
            return 0;
        }

        let restored = restorable.len();
        self.items.rcu(|current| {
            let mut next: Vec<EvidenceItem> = current.iter().cloned().collect();
            for item in &restorable {
                if !next.iter().any(|existing| existing.id == item.id) {
                    next.push(item.clone());
                }
            }
            next
        });
        tracing::info!(restored, dropped = total - restored, "evidence restored from session cache");
        self.notify();
        restored
    }

    fn notify(&self) {
        self.version.send_modify(|version| *version += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::session_cache::InMemorySessionCache;

    fn photo(byte: u8) -> EvidencePayload {
        EvidencePayload::new(vec![0xFF, 0xD8, 0xFF, byte], "image/jpeg")
    }

    #[test]
    fn test_add_preserves_capture_order() {
        let store = EvidenceStore::new();
        let ids: Vec<Uuid> = (0..5).map(|i| store.add(photo(i), EvidenceKind::Photo).id).collect();

        let stored: Vec<Uuid> = store.all().iter().map(|item| item.id).collect();
        assert_eq!(stored, ids);
        assert_eq!(store.count(), 5);
        assert!(store.all().iter().all(|item| item.upload_state.is_pending()));
    }

    #[test]
    fn test_order_unaffected_by_out_of_order_completion() {
        let store = EvidenceStore::new();
        let first = store.add(photo(1), EvidenceKind::Photo).id;
        let second = store.add(photo(2), EvidenceKind::Photo).id;

        for id in [first, second] {
            store.set_upload_state(id, UploadState::InProgress { percent: 0 }).unwrap();
        }
        store
            .set_upload_state(second, UploadState::Uploaded { url: "https://cdn/2".into() })
            .unwrap();
        store
            .set_upload_state(first, UploadState::Uploaded { url: "https://cdn/1".into() })
            .unwrap();

        let urls: Vec<_> = store
            .all()
            .iter()
            .map(|item| item.upload_state.remote_url().unwrap().to_string())
            .collect();
        assert_eq!(urls, vec!["https://cdn/1", "https://cdn/2"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = EvidenceStore::new();
        let keep = store.add(photo(1), EvidenceKind::Photo);
        let gone = store.add(photo(2), EvidenceKind::Photo);

        assert!(store.remove(gone.id));
        let after_first = store.all();
        assert!(!store.remove(gone.id));
        assert!(!store.remove(Uuid::new_v4()));

        assert_eq!(*store.all(), *after_first);
        assert_eq!(store.all()[0].id, keep.id);
    }

    #[test]
    fn test_unknown_id_is_non_fatal() {
        let store = EvidenceStore::new();
        let id = Uuid::new_v4();
        let result = store.set_upload_state(id, UploadState::InProgress { percent: 0 });
        assert_eq!(result, Err(StoreError::UnknownItem(id)));
    }

    #[test]
    fn test_failed_never_jumps_to_uploaded() {
        let store = EvidenceStore::new();
        let id = store.add(photo(1), EvidenceKind::Photo).id;
        store.set_upload_state(id, UploadState::InProgress { percent: 0 }).unwrap();
        store
            .set_upload_state(id, UploadState::Failed { reason: "offline".into() })
            .unwrap();

        let result = store.set_upload_state(id, UploadState::Uploaded { url: "https://cdn/x".into() });
        assert!(matches!(result, Err(StoreError::InvalidTransition { from: "failed", .. })));
        assert!(store.get(id).unwrap().upload_state.is_failed());
    }

    #[test]
    fn test_retry_path_ends_uploaded() {
        let store = EvidenceStore::new();
        let id = store.add(photo(1), EvidenceKind::Photo).id;
        for state in [
            UploadState::InProgress { percent: 0 },
            UploadState::Failed { reason: "timeout".into() },
            UploadState::Pending,
            UploadState::InProgress { percent: 50 },
            UploadState::Uploaded { url: "https://cdn/1".into() },
        ] {
            store.set_upload_state(id, state).unwrap();
        }
        let item = store.get(id).unwrap();
        assert_eq!(item.upload_state, UploadState::Uploaded { url: "https://cdn/1".into() });
        assert!(store.failed_ids().is_empty());
    }

    #[test]
    fn test_begin_upload_claims_once() {
        let store = EvidenceStore::new();
        let id = store.add(photo(1), EvidenceKind::Photo).id;

        let claimed = store.begin_upload(id).unwrap();
        assert_eq!(claimed.upload_state, UploadState::InProgress { percent: 0 });
        assert!(matches!(
            store.begin_upload(id),
            Err(StoreError::InvalidTransition { from: "in_progress", .. })
        ));

        let unknown = Uuid::new_v4();
        assert_eq!(store.begin_upload(unknown).err(), Some(StoreError::UnknownItem(unknown)));
    }

    #[test]
    fn test_failed_item_is_claimed_directly() {
        let store = EvidenceStore::new();
        let id = store.add(photo(1), EvidenceKind::Photo).id;
        store.begin_upload(id).unwrap();
        store
            .set_upload_state(id, UploadState::Failed { reason: "offline".into() })
            .unwrap();

        let claimed = store.begin_upload(id).unwrap();
        assert_eq!(claimed.upload_state, UploadState::InProgress { percent: 0 });
        store
            .set_upload_state(id, UploadState::Uploaded { url: "https://cdn/1".into() })
            .unwrap();
        assert!(matches!(
            store.begin_upload(id),
            Err(StoreError::InvalidTransition { from: "uploaded", .. })
        ));
    }

    #[tokio::test]
    async fn test_subscribers_see_every_mutation() {
        let store = EvidenceStore::new();
        let mut rx = store.subscribe();
        let id = store.add(photo(1), EvidenceKind::Photo).id;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);

        store.remove(id);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);
    }

    #[test]
    fn test_restore_keeps_only_uploaded_items() {
        let cache = InMemorySessionCache::new();
        let store = EvidenceStore::new();
        let uploaded = store.add(photo(1), EvidenceKind::Photo).id;
        store.add(photo(2), EvidenceKind::Photo);
        store.set_upload_state(uploaded, UploadState::InProgress { percent: 0 }).unwrap();
        store
            .set_upload_state(uploaded, UploadState::Uploaded { url: "https://cdn/1".into() })
            .unwrap();
        store.persist_to(&cache);

        let reloaded = EvidenceStore::new();
        assert_eq!(reloaded.restore_from(&cache), 1);
        assert_eq!(reloaded.all()[0].id, uploaded);
    }
}
