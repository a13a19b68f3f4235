//! Template store.
//!
//! Templates are reusable webhook payloads organized on disk by provider:
//! `~/.better-webhook/templates/<provider>/<name>.json`. A cached index of
//! the remote catalog lives alongside them with a `cachedAt` epoch
//! millisecond stamp; fetching the catalog itself is out of scope here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::record::HeaderPair;

/// Default template directory: `~/.better-webhook/templates`.
pub fn default_templates_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".better-webhook")
        .join("templates")
}

/// A stored webhook template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderPair>,
    pub body: Value,
}

/// A provider/name pair identifying a stored template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    pub provider: String,
    pub name: String,
}

/// Errors from template persistence.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template not found: {provider}/{name}")]
    NotFound { provider: String, name: String },

    #[error("template store I/O failed: {message}")]
    Io { message: String },

    #[error("template serialization failed: {message}")]
    Serialization { message: String },
}

impl TemplateError {
    fn io(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

/// Filesystem template store with per-provider subdirectories.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn template_path(&self, provider: &str, name: &str) -> PathBuf {
        self.dir.join(provider).join(format!("{}.json", name))
    }

    /// Persist a template under its provider subdirectory.
    pub async fn save(&self, template: &Template) -> Result<PathBuf, TemplateError> {
        let path = self.template_path(&template.provider, &template.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(TemplateError::io)?;
        }

        let json = serde_json::to_string_pretty(template).map_err(|e| {
            TemplateError::Serialization {
                message: e.to_string(),
            }
        })?;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(TemplateError::io)?;
        file.write_all(json.as_bytes())
            .await
            .map_err(TemplateError::io)?;
        file.flush().await.map_err(TemplateError::io)?;
        fs::rename(&temp_path, &path).await.map_err(TemplateError::io)?;

        debug!(provider = %template.provider, name = %template.name, "template saved");
        Ok(path)
    }

    /// Load a template by provider and name.
    pub async fn get(&self, provider: &str, name: &str) -> Result<Template, TemplateError> {
        let path = self.template_path(provider, name);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TemplateError::NotFound {
                    provider: provider.to_string(),
                    name: name.to_string(),
                });
            }
            Err(e) => return Err(TemplateError::io(e)),
        };
        serde_json::from_str(&json).map_err(|e| TemplateError::Serialization {
            message: e.to_string(),
        })
    }

    /// Every stored template, grouped by provider subdirectory.
    pub async fn list(&self) -> Result<Vec<TemplateRef>, TemplateError> {
        let mut out = Vec::new();
        let mut providers = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(TemplateError::io(e)),
        };

        while let Some(provider_entry) = providers.next_entry().await.map_err(TemplateError::io)? {
            let provider_path = provider_entry.path();
            if !provider_path.is_dir() {
                continue;
            }
            let provider = provider_entry.file_name().to_string_lossy().into_owned();

            let mut entries = fs::read_dir(&provider_path).await.map_err(TemplateError::io)?;
            while let Some(entry) = entries.next_entry().await.map_err(TemplateError::io)? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if let Some(stem) = name.strip_suffix(".json") {
                    out.push(TemplateRef {
                        provider: provider.clone(),
                        name: stem.to_string(),
                    });
                }
            }
        }

        out.sort_by(|a, b| (&a.provider, &a.name).cmp(&(&b.provider, &b.name)));
        Ok(out)
    }

    /// Templates for one provider.
    pub async fn list_provider(&self, provider: &str) -> Result<Vec<TemplateRef>, TemplateError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.provider == provider)
            .collect())
    }

    /// Remove a stored template.
    pub async fn delete(&self, provider: &str, name: &str) -> Result<(), TemplateError> {
        let path = self.template_path(provider, name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(TemplateError::NotFound {
                provider: provider.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(TemplateError::io(e)),
        }
    }
}

// ============================================================================
// Remote index cache
// ============================================================================

const INDEX_CACHE_FILE: &str = "index-cache.json";

/// One entry of the cached remote template index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateIndexEntry {
    pub provider: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Cached remote template index with its fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateIndexCache {
    /// Epoch milliseconds of the last successful fetch.
    pub cached_at: i64,
    pub templates: Vec<TemplateIndexEntry>,
}

impl TemplateIndexCache {
    /// Load the cache from a template directory; `None` when absent or
    /// unreadable.
    pub async fn load(dir: &Path) -> Option<Self> {
        let json = fs::read_to_string(dir.join(INDEX_CACHE_FILE)).await.ok()?;
        serde_json::from_str(&json).ok()
    }

    /// Persist the cache into a template directory.
    pub async fn save(&self, dir: &Path) -> Result<(), TemplateError> {
        fs::create_dir_all(dir).await.map_err(TemplateError::io)?;
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            TemplateError::Serialization {
                message: e.to_string(),
            }
        })?;
        fs::write(dir.join(INDEX_CACHE_FILE), json)
            .await
            .map_err(TemplateError::io)?;
        Ok(())
    }

    /// Whether the cache is older than `max_age_ms`.
    pub fn is_stale(&self, now_ms: i64, max_age_ms: i64) -> bool {
        now_ms - self.cached_at > max_age_ms
    }
}

#[cfg(test)]
#[path = "templates_tests.rs"]
mod tests;
