//! File storage collaborator. Turns uploaded bytes into a stable reference.
use super::config::UploadConfig;
use super::error::{ApprovalError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub trait FileStorage {
    /// Persist `bytes` and return the reference documents will carry as `file_url`.
    fn put(&self, original_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Stores uploads in a local directory, named by the sha256 of their contents.
pub struct LocalFileStorage {
    config: UploadConfig,
}

impl LocalFileStorage {
    pub fn new(config: UploadConfig) -> Result<Self> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self { config })
    }

    /// Where a reference returned by `put` lives on disk, if it is one of ours.
    pub fn resolve(&self, file_url: &str) -> Option<PathBuf> {
        let name = file_url
            .strip_prefix(self.config.url_prefix.as_str())?
            .strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains("..") {
            return None;
        }
        Some(self.config.dir.join(name))
    }
}

impl FileStorage for LocalFileStorage {
    fn put(&self, original_name: &str, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(ApprovalError::InvalidInput("File is required".into()));
        }
        if bytes.len() as u64 > self.config.max_bytes {
            return Err(ApprovalError::InvalidInput(format!(
                "file exceeds the {} byte upload limit",
                self.config.max_bytes
            )));
        }

        let name = format!("{}{}", sha256::digest(bytes), extension(original_name));
        let path = self.config.dir.join(&name);
        // identical content is already on disk under the same name
        if !path.exists() {
            fs::write(&path, bytes)?;
        }
        tracing::debug!(file = %name, size = bytes.len(), "stored upload");

        Ok(format!("{}/{}", self.config.url_prefix.trim_end_matches('/'), name))
    }
}

fn extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}
