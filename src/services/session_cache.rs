//! Tab-scoped, non-durable key/value cache bridging the capture screen and the
//! completion form. Nothing here is a storage guarantee.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::{EvidenceItem, LocationSample};

pub const REPORT_EVIDENCE_KEY: &str = "reportEvidence";
pub const DETECTED_LOCATION_KEY: &str = "detectedLocation";

pub trait SessionCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct InMemorySessionCache {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemorySessionCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionCache for InMemorySessionCache {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.lock() {
            Ok(entries) => entries.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn set(&self, key: &str, value: String) {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(key.to_string(), value);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(key.to_string(), value);
            }
        }
    }

    fn remove(&self, key: &str) {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.remove(key);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(key);
            }
        }
    }
}

/// Write evidence metadata (payloads are skipped by serialization).
pub fn save_evidence(cache: &dyn SessionCache, items: &[EvidenceItem]) {
    match serde_json::to_string(items) {
        Ok(json) => cache.set(REPORT_EVIDENCE_KEY, json),
        Err(e) => tracing::warn!(error = %e, "failed to serialize evidence metadata for session cache"),
    }
}

pub fn load_evidence(cache: &dyn SessionCache) -> Vec<EvidenceItem> {
    let Some(raw) = cache.get(REPORT_EVIDENCE_KEY) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "discarding unreadable evidence metadata in session cache");
            Vec::new()
        }
    }
}

pub fn save_location(cache: &dyn SessionCache, location: &LocationSample) {
    cache.set(DETECTED_LOCATION_KEY, location.address.clone());
}

pub fn load_location(cache: &dyn SessionCache) -> Option<String> {
    cache
        .get(DETECTED_LOCATION_KEY)
        .filter(|address| !address.trim().is_empty())
}

/// Drop everything belonging to the current report.
pub fn clear_report_session(cache: &dyn SessionCache) {
    cache.remove(REPORT_EVIDENCE_KEY);
    cache.remove(DETECTED_LOCATION_KEY);
}
