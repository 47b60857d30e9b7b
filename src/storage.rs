use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    fn path(&self, ident: &str) -> PathBuf;
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = storage_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        std::fs::metadata(self.path(ident)).is_ok()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.path(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.path(ident);
        let temp_path = self.base_dir.join(format!(".{ident}.tmp"));

        if let Err(e) = std::fs::write(&temp_path, data) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        std::fs::rename(&temp_path, &path)
    }

    fn path(&self, ident: &str) -> PathBuf {
        self.base_dir.join(ident)
    }
}

/// Errors raised while reading or writing JSON artifacts.
#[derive(Debug, thiserror::Error)]
pub enum JsonStoreError {
    #[error("I/O error on {ident}: {source}")]
    Io {
        ident: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {ident}: {source}")]
    Json {
        ident: String,
        #[source]
        source: serde_json::Error,
    },
}

impl JsonStoreError {
    /// True when the artifact simply does not exist yet.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JsonStoreError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Read and deserialize a JSON artifact.
pub fn read_json<T: DeserializeOwned>(
    store: &dyn StorageManager,
    ident: &str,
) -> Result<T, JsonStoreError> {
    let bytes = store.read(ident).map_err(|source| JsonStoreError::Io {
        ident: ident.to_string(),
        source,
    })?;

    serde_json::from_slice(&bytes).map_err(|source| JsonStoreError::Json {
        ident: ident.to_string(),
        source,
    })
}

/// Serialize and atomically write a JSON artifact.
pub fn write_json<T: Serialize + ?Sized>(
    store: &dyn StorageManager,
    ident: &str,
    value: &T,
) -> Result<(), JsonStoreError> {
    let bytes = serde_json::to_vec(value).map_err(|source| JsonStoreError::Json {
        ident: ident.to_string(),
        source,
    })?;

    store.write(ident, &bytes).map_err(|source| JsonStoreError::Io {
        ident: ident.to_string(),
        source,
    })
}
