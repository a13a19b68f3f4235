//! Filesystem capture store.
//!
//! One pretty-printed JSON file per capture in a single directory. Writes
//! go through a temp file and an atomic rename, so readers never observe a
//! partial record. Readers tolerate concurrent deletion and foreign files
//! by skipping anything that does not load.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::record::{CaptureFile, CaptureRecord};

/// Errors from capture persistence.
#[derive(Debug, thiserror::Error)]
pub enum CaptureStoreError {
    #[error("capture store I/O failed: {message}")]
    Io { message: String },

    #[error("capture serialization failed: {message}")]
    Serialization { message: String },

    #[error("capture not found: {query}")]
    NotFound { query: String },
}

impl CaptureStoreError {
    fn io(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

/// Default capture directory: `~/.better-webhook/captures`.
pub fn default_captures_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".better-webhook")
        .join("captures")
}

/// Filesystem-backed capture store.
///
/// # Examples
///
/// ```no_run
/// use better_webhook_capture::store::CaptureStore;
/// use std::path::PathBuf;
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = CaptureStore::new(PathBuf::from("./captures")).await?;
/// let recent = store.list(Some(20)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    /// Open a store, creating the directory if needed.
    pub async fn new(dir: PathBuf) -> Result<Self, CaptureStoreError> {
        fs::create_dir_all(&dir).await.map_err(CaptureStoreError::io)?;
        Ok(Self { dir })
    }

    /// The backing directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a capture, returning the stored file.
    ///
    /// The write is atomic with respect to readers: content goes to a temp
    /// file first and is renamed into place.
    pub async fn save(&self, capture: CaptureRecord) -> Result<CaptureFile, CaptureStoreError> {
        let filename = capture.filename();
        let final_path = self.dir.join(&filename);
        let temp_path = final_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(&capture).map_err(|e| {
            CaptureStoreError::Serialization {
                message: e.to_string(),
            }
        })?;

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(CaptureStoreError::io)?;
        file.write_all(json.as_bytes())
            .await
            .map_err(CaptureStoreError::io)?;
        file.flush().await.map_err(CaptureStoreError::io)?;
        fs::rename(&temp_path, &final_path)
            .await
            .map_err(CaptureStoreError::io)?;

        debug!(file = %filename, id = %capture.id, "capture persisted");
        Ok(CaptureFile {
            file: filename,
            capture,
        })
    }

    /// Filenames of every capture, newest first.
    async fn filenames_desc(&self) -> Result<Vec<String>, CaptureStoreError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await.map_err(CaptureStoreError::io)?;
        while let Some(entry) = entries.next_entry().await.map_err(CaptureStoreError::io)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Load one capture file; `None` when missing or unreadable.
    async fn load(&self, filename: &str) -> Option<CaptureFile> {
        let path = self.dir.join(filename);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            // Deleted between listing and reading, or not ours: skip.
            Err(_) => return None,
        };
        match serde_json::from_str::<CaptureRecord>(&json) {
            Ok(capture) => Some(CaptureFile {
                file: filename.to_string(),
                capture,
            }),
            Err(e) => {
                warn!(file = %filename, error = %e, "skipping unreadable capture file");
                None
            }
        }
    }

    /// The `limit` most recent captures, newest first.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<CaptureFile>, CaptureStoreError> {
        let names = self.filenames_desc().await?;
        let take = limit.unwrap_or(usize::MAX);

        let mut out = Vec::new();
        for name in names {
            if out.len() >= take {
                break;
            }
            if let Some(capture) = self.load(&name).await {
                out.push(capture);
            }
        }
        Ok(out)
    }

    /// Find a capture by exact id, then filename substring, then id
    /// prefix.
    pub async fn get(&self, query: &str) -> Result<CaptureFile, CaptureStoreError> {
        let names = self.filenames_desc().await?;

        let mut loaded = Vec::with_capacity(names.len());
        for name in &names {
            if let Some(capture) = self.load(name).await {
                loaded.push(capture);
            }
        }

        if let Some(hit) = loaded.iter().find(|c| c.capture.id == query) {
            return Ok(hit.clone());
        }
        if let Some(hit) = loaded.iter().find(|c| c.file.contains(query)) {
            return Ok(hit.clone());
        }
        if let Some(hit) = loaded.iter().find(|c| c.capture.id.starts_with(query)) {
            return Ok(hit.clone());
        }

        Err(CaptureStoreError::NotFound {
            query: query.to_string(),
        })
    }

    /// Case-insensitive scan over id, path, method, provider, and
    /// filename.
    pub async fn search(&self, query: &str) -> Result<Vec<CaptureFile>, CaptureStoreError> {
        let needle = query.to_lowercase();
        let names = self.filenames_desc().await?;

        let mut out = Vec::new();
        for name in names {
            let Some(entry) = self.load(&name).await else {
                continue;
            };
            let capture = &entry.capture;
            let matched = capture.id.to_lowercase().contains(&needle)
                || capture.path.to_lowercase().contains(&needle)
                || capture.method.to_lowercase().contains(&needle)
                || capture
                    .provider
                    .as_deref()
                    .is_some_and(|p| p.to_lowercase().contains(&needle))
                || entry.file.to_lowercase().contains(&needle);
            if matched {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Delete one capture by id (any form `get` accepts).
    pub async fn delete(&self, query: &str) -> Result<CaptureFile, CaptureStoreError> {
        let entry = self.get(query).await?;
        fs::remove_file(self.dir.join(&entry.file))
            .await
            .map_err(CaptureStoreError::io)?;
        Ok(entry)
    }

    /// Delete every capture file, returning how many were removed.
    pub async fn delete_all(&self) -> Result<usize, CaptureStoreError> {
        let names = self.filenames_desc().await?;
        let mut removed = 0;
        for name in names {
            match fs::remove_file(self.dir.join(&name)).await {
                Ok(()) => removed += 1,
                // Already gone: fine.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CaptureStoreError::io(e)),
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
