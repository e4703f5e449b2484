//! Durable byte storage.
//!
//! The core only ever reads or replaces a whole document, so the capability
//! is two calls: [`Storage::read_all`] and [`Storage::write_all`].

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Write rejected by the backend.
    #[error("write rejected: {0}")]
    Rejected(String),
}

pub trait Storage: Send + Sync {
    /// Returns the stored document, or `None` if nothing was ever written.
    fn read_all(&self) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replaces the stored document. Either the whole write lands or none of it.
    fn write_all(&self, bytes: &[u8]) -> Result<(), StorageError>;
}

/// File-backed storage using tmp file + fsync + rename.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Storage for FileStorage {
    fn read_all(&self) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn write_all(&self, bytes: &[u8]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let tmp = self.tmp_path();
        let mut file = File::create(&tmp).map_err(|e| self.io_err(e))?;
        file.write_all(bytes).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }
}

/// In-memory storage that counts writes and can be told to fail them.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    bytes: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes.into())),
            ..Self::default()
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.lock().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Vec<u8>>> {
        self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read_all(&self) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock().clone())
    }

    fn write_all(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("memory storage set to fail".into()));
        }
        *self.lock() = Some(bytes.to_vec());
        Ok(())
    }
}
