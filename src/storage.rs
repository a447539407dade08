//! Storage abstraction for reading sources and writing artifacts.
//!
//! Every byte this crate reads or writes goes through [`Storage`], so the
//! resolver and transform engine never call `std::fs` directly:
//!
//! | Operation | Used by |
//! |---|---|
//! | `exists` | cache-hit check, root-relative resolution |
//! | `read_bytes` | cache key checksum, codec input |
//! | `write_bytes` | artifact persistence (creates parent directories) |
//! | `list_children` / `is_directory` | breadth-first resolution |
//! | `join` | building probe and output paths |
//!
//! [`FsStorage`] is the production implementation. Tests use an in-memory
//! implementation so traversal order and write counts are observable.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to list {path}: {source}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Byte-level access to the source tree and the published output tree.
///
/// Implementations must be thread-safe: the rewriter issues calls from many
/// rayon workers at once and adds no locking of its own.
pub trait Storage: Sync {
    fn exists(&self, path: &Path) -> bool;

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Write a file, creating missing parent directories.
    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError>;

    /// Immediate children of a directory (files and directories).
    fn list_children(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError>;

    fn is_directory(&self, path: &Path) -> bool;

    fn join(&self, base: &Path, relative: &str) -> PathBuf {
        base.join(relative)
    }
}

/// Local filesystem storage.
///
/// Children are listed sorted by path so repeated runs walk the same order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for FsStorage {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        fs::read(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let write_err = |source| StorageError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, bytes).map_err(write_err)
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
        let list_err = |source| StorageError::List {
            path: dir.to_path_buf(),
            source,
        };
        let mut children = Vec::new();
        for entry in fs::read_dir(dir).map_err(list_err)? {
            children.push(entry.map_err(list_err)?.path());
        }
        children.sort();
        Ok(children)
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }
}
