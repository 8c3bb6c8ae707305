//! Runtime configuration for the store and the upload area
use std::env;
use std::path::PathBuf;

pub const DB_PATH_VAR: &str = "DOCFLOW_DB_PATH";
pub const UPLOAD_DIR_VAR: &str = "DOCFLOW_UPLOAD_DIR";
pub const MAX_UPLOAD_BYTES_VAR: &str = "DOCFLOW_MAX_UPLOAD_BYTES";

// 10 MiB per uploaded file
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub temporary: bool,
    pub cache_capacity: u64,
    pub flush_every_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub url_prefix: String,
    pub max_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("docflow.db"),
            temporary: false,
            cache_capacity: 64 * 1024 * 1024,
            flush_every_ms: Some(500),
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// An in-memory db that is removed on drop. Used by tests and demos.
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        match env::var(DB_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::at(path),
            _ => Self::default(),
        }
    }

    pub fn to_sled(&self) -> sled::Config {
        let config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .flush_every_ms(self.flush_every_ms);

        // sled picks a unique scratch path for temporary dbs
        if self.temporary {
            config.temporary(true)
        } else {
            config.path(&self.path)
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            url_prefix: "/uploads".to_string(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadConfig {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var(UPLOAD_DIR_VAR) {
            if !dir.trim().is_empty() {
                config.dir = PathBuf::from(dir);
            }
        }
        if let Some(max) = env::var(MAX_UPLOAD_BYTES_VAR)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            config.max_bytes = max;
        }
        config
    }
}
