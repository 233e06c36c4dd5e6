//! Filesystem access for transferred files.
//!
//! Sessions read a whole file before the first block goes out and write a
//! whole file after the last block came in; nothing is streamed.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::core::ErrorCode;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("access violation: {0}")]
    AccessViolation(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classify an I/O failure on the file the peer asked for.
    ///
    /// Only the requested `name` is kept: the message ends up in ERROR
    /// packets and must not reveal where the served directory lives.
    fn from_io(name: &str, source: io::Error) -> Self {
        let name = name.to_string();
        match source.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(name),
            io::ErrorKind::PermissionDenied => StoreError::AccessViolation(name),
            io::ErrorKind::AlreadyExists => StoreError::AlreadyExists(name),
            _ => StoreError::Io { path: name, source },
        }
    }

    /// ERROR packet code reported to the peer for this failure
    pub fn error_code(&self) -> ErrorCode {
        match self {
            StoreError::NotFound(_) => ErrorCode::FileNotFound,
            StoreError::AccessViolation(_) => ErrorCode::AccessViolation,
            StoreError::AlreadyExists(_) => ErrorCode::FileExists,
            StoreError::Io { source, .. } if source.kind() == io::ErrorKind::StorageFull => {
                ErrorCode::DiskFull
            }
            StoreError::Io { .. } => ErrorCode::NotDefined,
        }
    }
}

/// Whole-file storage used by transfer sessions
pub trait FileStore: Send + Sync {
    /// Read the complete content of `path`
    fn read_file(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Check up front that `name` may be created, before any block is acknowledged
    fn check_create(&self, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }

    /// Create (or replace) `name` with `bytes`
    fn create_file(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Last `/`-separated segment of a requested file name.
///
/// Uploaded and downloaded files are always stored under this name.
pub fn destination_name(requested: &str) -> &str {
    requested
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(requested)
}

/// Run a store operation on the blocking thread pool
pub async fn blocking<T, F>(store: &Arc<dyn FileStore>, path: &str, op: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn FileStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StoreError::Io {
            path: path.to_string(),
            source: io::Error::other(e),
        })?
}

/// Server-side store confined to a send and a receive directory
pub struct RootedStore {
    send_directory: PathBuf,
    receive_directory: PathBuf,
    overwrite: bool,
}

impl RootedStore {
    pub fn new(send_directory: PathBuf, receive_directory: PathBuf, overwrite: bool) -> Self {
        Self {
            send_directory,
            receive_directory,
            overwrite,
        }
    }

    fn resolve(root: &Path, requested: &str) -> Result<PathBuf, StoreError> {
        if requested.is_empty() || requested.contains('\0') {
            return Err(StoreError::AccessViolation(format!(
                "invalid file name {:?}",
                requested
            )));
        }

        let relative = Path::new(requested);
        let mut resolved = root.to_path_buf();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StoreError::AccessViolation(format!(
                        "{} escapes the served directory",
                        requested
                    )));
                }
            }
        }
        Ok(resolved)
    }

    fn target(&self, name: &str) -> Result<PathBuf, StoreError> {
        let name = destination_name(name);
        if name == "." || name == ".." {
            return Err(StoreError::AccessViolation(format!(
                "invalid file name {:?}",
                name
            )));
        }
        Self::resolve(&self.receive_directory, name)
    }
}

impl FileStore for RootedStore {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let full = Self::resolve(&self.send_directory, path)?;
        if full.is_dir() {
            return Err(StoreError::AccessViolation(format!("{} is a directory", path)));
        }
        fs::read(&full).map_err(|e| StoreError::from_io(path, e))
    }

    fn check_create(&self, name: &str) -> Result<(), StoreError> {
        let full = self.target(name)?;
        if full.is_dir() {
            return Err(StoreError::AccessViolation(format!("{} is a directory", name)));
        }
        if !self.overwrite && full.exists() {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    fn create_file(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.check_create(name)?;
        let full = self.target(name)?;
        fs::write(&full, bytes).map_err(|e| StoreError::from_io(destination_name(name), e))
    }
}

/// Client-side store: reads local paths as given, writes into one directory
pub struct LocalStore {
    output_directory: PathBuf,
}

impl LocalStore {
    pub fn new(output_directory: PathBuf) -> Self {
        Self { output_directory }
    }
}

impl FileStore for LocalStore {
    fn read_file(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        fs::read(path).map_err(|e| StoreError::from_io(path, e))
    }

    fn create_file(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let name = destination_name(name);
        let full = RootedStore::resolve(&self.output_directory, name)?;
        fs::write(&full, bytes).map_err(|e| StoreError::from_io(name, e))
    }
}
