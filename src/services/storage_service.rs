use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::{error::ApiError, models::extension_for};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvidence {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct EvidenceFile {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Where accepted uploads end up.
#[async_trait]
pub trait EvidenceStorage: Send + Sync {
    async fn store(&self, data: &[u8], mime_type: &str) -> Result<StoredEvidence, ApiError>;
    async fn load(&self, name: &str) -> Result<Option<EvidenceFile>, ApiError>;
    async fn health_check(&self) -> Result<(), ApiError>;
}

/// Files on local disk, one per upload, named `<uuid>.<ext>`.
pub struct LocalEvidenceStorage {
    root: PathBuf,
}

impl LocalEvidenceStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "jpg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webm" => Some("video/webm"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}

/// Accept only names this storage could have produced: `<uuid>.<known ext>`.
/// Anything else (separators, `..`, unknown extensions) is rejected outright.
fn parse_stored_name(name: &str) -> Option<&'static str> {
    let (stem, extension) = name.rsplit_once('.')?;
    Uuid::parse_str(stem).ok()?;
    if stem.len() != 36 {
        return None;
    }
    mime_for_extension(extension)
}

#[async_trait]
impl EvidenceStorage for LocalEvidenceStorage {
    async fn store(&self, data: &[u8], mime_type: &str) -> Result<StoredEvidence, ApiError> {
        fs::create_dir_all(&self.root).await?;

        let name = format!("{}.{}", Uuid::new_v4(), extension_for(mime_type));
        let path = self.root.join(&name);
        fs::write(&path, data).await?;

        tracing::info!(file = %name, size = data.len(), mime_type = %mime_type, "evidence stored");
        Ok(StoredEvidence {
            name,
            mime_type: mime_type.to_string(),
            size: data.len() as u64,
        })
    }

    async fn load(&self, name: &str) -> Result<Option<EvidenceFile>, ApiError> {
        let Some(mime_type) = parse_stored_name(name) else {
            tracing::warn!(requested = %name, "rejected evidence file name");
            return Ok(None);
        };

        match fs::read(self.root.join(name)).await {
            Ok(data) => Ok(Some(EvidenceFile {
                mime_type: mime_type.to_string(),
                data,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ApiError::Io(e)),
        }
    }

    async fn health_check(&self) -> Result<(), ApiError> {
        fs::create_dir_all(&self.root).await?;
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(ApiError::internal("Upload storage path is not a directory"));
        }
        if metadata.permissions().readonly() {
            return Err(ApiError::internal("Upload storage directory is read-only"));
        }
        Ok(())
    }
}
