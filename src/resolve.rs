//! Base-name → source file resolution.
//!
//! A reference names an image the way an author thinks of it: `logo`,
//! `hero.jpg`, or `photos/2024/cat`. This module finds the file on storage.
//!
//! - Names containing `/` are root-relative. With a recognized extension the
//!   exact path is probed; without one, each extension is tried in priority
//!   order. A name with a `..` component never resolves, so references
//!   cannot reach outside the root.
//! - Bare names are found by a breadth-first walk of the search root. The
//!   first file whose name is `base` (when `base` has an extension) or
//!   `base + ext` for any recognized extension wins.
//!
//! When the same name exists in several directories, the winner is whichever
//! the walk reaches first. Shallower files always beat deeper ones; between
//! siblings the order is whatever the storage lists.

use crate::reference::{IMAGE_EXTENSIONS, match_extension};
use crate::storage::{Storage, StorageError};
use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};

/// Find the source file for `base_name` under `root`.
///
/// Returns `Ok(None)` when nothing matches. Storage errors while listing
/// directories propagate.
pub fn resolve<S: Storage + ?Sized>(
    storage: &S,
    root: &Path,
    base_name: &str,
) -> Result<Option<PathBuf>, StorageError> {
    if base_name.contains('/') {
        return Ok(resolve_root_relative(storage, root, base_name));
    }
    resolve_by_search(storage, root, base_name)
}

fn resolve_root_relative<S: Storage + ?Sized>(
    storage: &S,
    root: &Path,
    base_name: &str,
) -> Option<PathBuf> {
    let relative = base_name.trim_start_matches('/');
    if Path::new(relative)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return None;
    }
    let is_file = |p: &PathBuf| storage.exists(p) && !storage.is_directory(p);

    if match_extension(relative).is_some() {
        let path = storage.join(root, relative);
        return is_file(&path).then_some(path);
    }

    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| storage.join(root, &format!("{relative}{ext}")))
        .find(is_file)
}

fn resolve_by_search<S: Storage + ?Sized>(
    storage: &S,
    root: &Path,
    base_name: &str,
) -> Result<Option<PathBuf>, StorageError> {
    let has_extension = match_extension(base_name).is_some();
    let mut queue: VecDeque<PathBuf> = storage.list_children(root)?.into();

    while let Some(entry) = queue.pop_front() {
        if storage.is_directory(&entry) {
            queue.extend(storage.list_children(&entry)?);
            continue;
        }
        let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let matched = if has_extension {
            name == base_name
        } else {
            is_base_with_extension(name, base_name)
        };
        if matched {
            tracing::debug!(base_name, path = %entry.display(), "Resolved image reference");
            return Ok(Some(entry));
        }
    }
    Ok(None)
}

/// `name == base + ext` for some recognized extension (extension compared
/// case-insensitively).
fn is_base_with_extension(name: &str, base: &str) -> bool {
    let Some(suffix) = name.strip_prefix(base) else {
        return false;
    };
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| suffix.eq_ignore_ascii_case(ext))
}
