//! Crash-safe JSON file commits.

use crate::error::{Result, StateError};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Replace `path` with the JSON form of `value`.
///
/// The bytes go to a sibling temp file which is synced and renamed over the
/// target, so a reader sees either the previous or the new content.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let temp_path = write_temp(path, value)?;

    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StateError::io(path, error));
    }
    sync_parent(path);
    Ok(())
}

/// Write the JSON form of `value` to `path` only if nothing exists there.
///
/// Returns `Ok(false)` without touching the existing file when the name is
/// taken. The content becomes visible in one step through a hard link of a
/// fully synced temp file.
pub fn write_json_new<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<bool> {
    let temp_path = write_temp(path, value)?;

    let linked = fs::hard_link(&temp_path, path);
    let _ = fs::remove_file(&temp_path);
    match linked {
        Ok(()) => {
            sync_parent(path);
            Ok(true)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(error) => Err(StateError::io(path, error)),
    }
}

fn write_temp<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|error| StateError::io(parent, error))?;
    }

    let serialized = serde_json::to_vec_pretty(value)?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp.{}", uuid::Uuid::new_v4()));

    let mut temp_file = File::create(&temp_path).map_err(|error| StateError::io(&temp_path, error))?;
    temp_file
        .write_all(&serialized)
        .and_then(|()| temp_file.sync_all())
        .map_err(|error| {
            let _ = fs::remove_file(&temp_path);
            StateError::io(&temp_path, error)
        })?;

    Ok(temp_path)
}

/// Best effort: persist the directory entry of a rename on platforms that
/// allow syncing a directory handle.
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
