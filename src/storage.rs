//! Storage gateway boundary.
//!
//! The pipeline never touches raw file bytes outside this trait. Production
//! deployments implement `StorageGateway` against their blob store; the
//! crate ships a local-disk gateway so the pipeline is runnable standalone,
//! and an in-memory gateway for tests.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Metadata serialization error: {0}")]
    Serialization(String),
}

/// Metadata supplied by the caller at upload time.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub file_name: String,
    pub content_type: String,
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: String,
    pub path: String,
    pub hash: String,
}

/// Stored-object metadata as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub hash: String,
    pub stored_at: DateTime<Utc>,
}

pub trait StorageGateway: Send + Sync {
    fn upload(&self, bytes: &[u8], meta: &UploadMetadata) -> Result<StoredObject, StorageError>;
    fn download(&self, id: &str) -> Result<Vec<u8>, StorageError>;
    fn delete(&self, id: &str) -> Result<bool, StorageError>;
    fn get_metadata(&self, id: &str) -> Result<Option<ObjectMetadata>, StorageError>;
    fn generate_temporary_url(&self, id: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Compute the SHA-256 hex digest of a byte stream.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Local disk gateway
// ---------------------------------------------------------------------------

/// Disk-backed gateway: objects at `<root>/<id>`, metadata as a JSON sidecar.
pub struct LocalStorageGateway {
    root: PathBuf,
}

impl LocalStorageGateway {
    pub fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn object_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.meta.json"))
    }
}

impl StorageGateway for LocalStorageGateway {
    fn upload(&self, bytes: &[u8], meta: &UploadMetadata) -> Result<StoredObject, StorageError> {
        let id = Uuid::new_v4().to_string();
        let hash = content_hash(bytes);
        let path = self.object_path(&id);

        fs::write(&path, bytes)?;

        let metadata = ObjectMetadata {
            file_name: meta.file_name.clone(),
            content_type: meta.content_type.clone(),
            size_bytes: bytes.len() as u64,
            hash: hash.clone(),
            stored_at: Utc::now(),
        };
        let meta_json = serde_json::to_string(&metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(self.meta_path(&id), meta_json)?;

        Ok(StoredObject {
            id,
            path: path.to_string_lossy().into_owned(),
            hash,
        })
    }

    fn download(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(id);
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let path = self.object_path(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        let meta = self.meta_path(id);
        if meta.exists() {
            fs::remove_file(meta)?;
        }
        Ok(true)
    }

    fn get_metadata(&self, id: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        let meta = self.meta_path(id);
        if !meta.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(meta)?;
        let metadata = serde_json::from_str(&json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(Some(metadata))
    }

    fn generate_temporary_url(&self, id: &str, ttl: Duration) -> Result<String, StorageError> {
        let path = self.object_path(id);
        if !path.exists() {
            return Err(StorageError::NotFound(id.to_string()));
        }
        let expires = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(expires.to_rfc3339());
        Ok(format!("file://{}?expires={token}", path.display()))
    }
}

// ---------------------------------------------------------------------------
// In-memory gateway (tests)
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStorageGateway {
    objects: Mutex<HashMap<String, (Vec<u8>, ObjectMetadata)>>,
}

impl MemoryStorageGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageGateway for MemoryStorageGateway {
    fn upload(&self, bytes: &[u8], meta: &UploadMetadata) -> Result<StoredObject, StorageError> {
        let id = Uuid::new_v4().to_string();
        let hash = content_hash(bytes);
        let metadata = ObjectMetadata {
            file_name: meta.file_name.clone(),
            content_type: meta.content_type.clone(),
            size_bytes: bytes.len() as u64,
            hash: hash.clone(),
            stored_at: Utc::now(),
        };
        let mut objects = self.objects.lock().expect("storage lock poisoned");
        objects.insert(id.clone(), (bytes.to_vec(), metadata));
        Ok(StoredObject {
            id: id.clone(),
            path: format!("memory://{id}"),
            hash,
        })
    }

    fn download(&self, id: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.lock().expect("storage lock poisoned");
        objects
            .get(id)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut objects = self.objects.lock().expect("storage lock poisoned");
        Ok(objects.remove(id).is_some())
    }

    fn get_metadata(&self, id: &str) -> Result<Option<ObjectMetadata>, StorageError> {
        let objects = self.objects.lock().expect("storage lock poisoned");
        Ok(objects.get(id).map(|(_, meta)| meta.clone()))
    }

    fn generate_temporary_url(&self, id: &str, ttl: Duration) -> Result<String, StorageError> {
        let objects = self.objects.lock().expect("storage lock poisoned");
        if !objects.contains_key(id) {
            return Err(StorageError::NotFound(id.to_string()));
        }
        let expires = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(expires.to_rfc3339());
        Ok(format!("memory://{id}?expires={token}"))
    }
}
