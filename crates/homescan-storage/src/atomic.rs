//! Temp-file-then-rename writes shared by every persisted file.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::StorageError;

/// Replace `path` with `bytes` so readers only ever observe the old or the new content.
///
/// The temporary file lives next to the target so the final rename never crosses a
/// filesystem boundary. Temporary names start with `.` and end in `.tmp`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&parent)
        .await
        .map_err(StorageError::io("creating directory", &parent))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

    let written = async {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(StorageError::io("opening temp file", &temp_path))?;
        file.write_all(bytes)
            .await
            .map_err(StorageError::io("writing temp file", &temp_path))?;
        file.flush()
            .await
            .map_err(StorageError::io("flushing temp file", &temp_path))?;
        file.sync_all()
            .await
            .map_err(StorageError::io("syncing temp file", &temp_path))?;
        drop(file);
        fs::rename(&temp_path, path)
            .await
            .map_err(StorageError::io("renaming temp file into", path))
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    written
}

pub fn is_temp_file_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

/// Remove temp files a crashed writer left in `dir`. Only safe while holding the run lock.
pub async fn sweep_temp_files(dir: &Path) -> Result<usize, StorageError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(StorageError::io("listing", dir)(err)),
    };
    let mut removed = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(StorageError::io("listing", dir))?
    {
        if !is_temp_file_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(err) => warn!(path = %path.display(), error = %err, "could not remove stale temp file"),
        }
    }
    if removed > 0 {
        debug!(dir = %dir.display(), removed, "stale temp files removed");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn replaces_content_without_leaving_temp_files() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("nested").join("state.json");

        write_atomic(&target, b"{\"v\":1}").await.expect("first write");
        write_atomic(&target, b"{\"v\":2}").await.expect("second write");

        assert_eq!(std::fs::read(&target).expect("read"), b"{\"v\":2}");
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_temp_file_name(&e.file_name().to_string_lossy()))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn failed_rename_cleans_up_temp_file() {
        let dir = tempdir().expect("tempdir");
        let target = dir.path().join("occupied");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("child"), b"x").unwrap();

        let err = write_atomic(&target, b"data").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        let temps = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_temp_file_name(&e.file_name().to_string_lossy()))
            .count();
        assert_eq!(temps, 0);
    }

    #[tokio::test]
    async fn sweep_removes_only_orphaned_temp_files() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join(".0b1c.42.tmp"), b"half").unwrap();
        std::fs::write(dir.path().join(".9f3e.7.tmp"), b"half").unwrap();
        std::fs::write(dir.path().join("2026-01-14_a1.json"), b"{}").unwrap();
        std::fs::write(dir.path().join(".lock"), b"pid=1").unwrap();

        assert_eq!(sweep_temp_files(dir.path()).await.unwrap(), 2);
        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec![".lock", "2026-01-14_a1.json"]);

        assert_eq!(sweep_temp_files(&dir.path().join("missing")).await.unwrap(), 0);
    }
}
