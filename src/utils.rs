//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Serialize `value` as pretty JSON and atomically replace `path` with it
///
/// The JSON is written to a sibling `*.tmp` file first and then renamed over the
/// destination, so a crash mid-write leaves the previous file intact. Parent
/// directories are created as needed.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = tmp_sibling(path);
    tokio::fs::write(&tmp_path, &json).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        tokio::fs::remove_file(&tmp_path).await.ok();
        return Err(Error::Io(e));
    }
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Poll until `path` exists and its first byte can be read
///
/// Returns [`Error::ArtifactMissing`] if the file is not readable within `timeout`.
/// An empty file counts as readable.
pub async fn wait_for_readable(path: &Path, timeout: Duration, interval: Duration) -> Result<()> {
    let start = tokio::time::Instant::now();
    loop {
        if is_readable(path).await {
            tracing::debug!(path = %path.display(), "File is ready");
            return Ok(());
        }
        if start.elapsed() >= timeout {
            tracing::warn!(
                path = %path.display(),
                timeout_secs = timeout.as_secs(),
                "Timed out waiting for file"
            );
            return Err(Error::ArtifactMissing {
                path: path.to_path_buf(),
                waited_secs: timeout.as_secs(),
            });
        }
        tokio::time::sleep(interval).await;
    }
}

async fn is_readable(path: &Path) -> bool {
    match tokio::fs::File::open(path).await {
        Ok(mut file) => {
            let mut buf = [0u8; 1];
            file.read(&mut buf).await.is_ok()
        }
        Err(_) => false,
    }
}

/// Size of a file in bytes, `None` if it does not exist or is not a file
pub async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Validate a platform identifier (video, owner or season id)
///
/// Identifiers end up in task ids, file names and request URLs, so only ASCII letters
/// and digits are accepted.
pub fn validate_platform_id(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::validation(
            field,
            format!("must contain only ASCII letters and digits, got {value:?}"),
        ));
    }
    Ok(())
}

/// Validate a task output directory
///
/// The directory must be non-empty, relative, and free of `..` components; it is always
/// resolved under the configured download root.
pub fn validate_output_dir(output_dir: &str) -> Result<()> {
    let trimmed = output_dir.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("output_dir", "must not be empty"));
    }

    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::validation(
                    "output_dir",
                    "must not contain '..' components",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(Error::validation("output_dir", "must be a relative path"));
            }
        }
    }
    Ok(())
}

/// Remove intermediate files that share `stem` with a finished artifact
///
/// For a stem `/out/Title` and suffixes `[".part", ".info.json"]` this removes
/// `/out/Title.part` and `/out/Title.info.json` when present. `keep` is never removed,
/// even when its name matches. Failures are logged and skipped. Returns the number of
/// files removed.
pub async fn remove_intermediates(stem: &Path, suffixes: &[String], keep: &Path) -> usize {
    let mut removed = 0;
    for suffix in suffixes {
        let mut name = stem.as_os_str().to_os_string();
        name.push(suffix);
        let candidate = PathBuf::from(name);
        if candidate == keep {
            continue;
        }

        match tokio::fs::remove_file(&candidate).await {
            Ok(()) => {
                tracing::debug!(path = %candidate.display(), "Removed intermediate file");
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %candidate.display(), error = %e, "Failed to remove intermediate file");
            }
        }
    }
    removed
}

/// File name of a path as a display string
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_json_atomic_creates_parents_and_leaves_no_tmp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/state/tasks.json");

        write_json_atomic(&path, &serde_json::json!({"a": 1}))
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["a"], 1);
        assert!(!dir.path().join("nested/state/tasks.json.tmp").exists());
    }

    #[tokio::test]
    async fn write_json_atomic_replaces_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        write_json_atomic(&path, &vec![1, 2, 3]).await.unwrap();
        write_json_atomic(&path, &vec![4]).await.unwrap();

        let value: Vec<i32> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value, vec![4]);
    }

    #[tokio::test]
    async fn wait_for_readable_returns_immediately_for_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"ID3").unwrap();

        wait_for_readable(&path, Duration::from_millis(50), Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_readable_sees_file_created_later() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("late.mp3");
        let writer_path = path.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            tokio::fs::write(&writer_path, b"data").await.unwrap();
        });

        wait_for_readable(&path, Duration::from_secs(2), Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_for_readable_times_out_with_artifact_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.mp3");

        let err = wait_for_readable(&path, Duration::from_millis(40), Duration::from_millis(10))
            .await
            .unwrap_err();
        match err {
            Error::ArtifactMissing { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected ArtifactMissing, got {other:?}"),
        }
    }

    #[test]
    fn output_dir_validation() {
        assert!(validate_output_dir("books/三体").is_ok());
        assert!(validate_output_dir("./book").is_ok());
        assert!(validate_output_dir("").is_err());
        assert!(validate_output_dir("   ").is_err());
        assert!(validate_output_dir("../escape").is_err());
        assert!(validate_output_dir("a/../../b").is_err());
        assert!(validate_output_dir("/etc").is_err());
    }

    #[test]
    fn platform_id_validation() {
        assert!(validate_platform_id("video_id", "BV1xx411c7mD").is_ok());
        assert!(validate_platform_id("season_id", "1713211").is_ok());
        for bad in ["", "  ", "BV1/../x", "..", "BV1?p=2", "BV 1", "视频"] {
            assert!(
                matches!(
                    validate_platform_id("video_id", bad),
                    Err(Error::Validation { field: "video_id", .. })
                ),
                "accepted {bad:?}"
            );
        }
    }

    #[tokio::test]
    async fn remove_intermediates_only_touches_listed_suffixes() {
        let dir = tempdir().unwrap();
        let stem = dir.path().join("Episode 1");
        std::fs::write(dir.path().join("Episode 1.mp3"), b"audio").unwrap();
        std::fs::write(dir.path().join("Episode 1.info.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("Episode 1.m4a"), b"raw").unwrap();

        let suffixes = vec![
            ".info.json".to_string(),
            ".m4a".to_string(),
            ".part".to_string(),
        ];
        let removed = remove_intermediates(&stem, &suffixes, &dir.path().join("Episode 1.mp3")).await;

        assert_eq!(removed, 2);
        assert!(dir.path().join("Episode 1.mp3").exists());
        assert!(!dir.path().join("Episode 1.info.json").exists());
        assert!(!dir.path().join("Episode 1.m4a").exists());
    }

    #[tokio::test]
    async fn remove_intermediates_spares_the_kept_artifact() {
        let dir = tempdir().unwrap();
        let keep = dir.path().join("Episode 1.m4a");
        std::fs::write(&keep, b"audio").unwrap();

        let removed =
            remove_intermediates(&dir.path().join("Episode 1"), &[".m4a".to_string()], &keep).await;

        assert_eq!(removed, 0);
        assert!(keep.exists());
    }

    #[tokio::test]
    async fn file_size_reports_none_for_missing_and_dirs() {
        let dir = tempdir().unwrap();
        assert_eq!(file_size(dir.path()).await, None);
        assert_eq!(file_size(&dir.path().join("x")).await, None);
        let f = dir.path().join("f");
        std::fs::write(&f, [0u8; 10]).unwrap();
        assert_eq!(file_size(&f).await, Some(10));
    }
}
