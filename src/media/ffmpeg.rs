//! ffmpeg backed tag writer

use super::traits::{AudioTags, TagWriter};
use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Tag writer that remuxes the artifact with `ffmpeg`
///
/// The audio stream is copied (never re-encoded) into a sibling temp file together
/// with ID3v2.3 tags and, when given, the cover as an attached picture. The temp file
/// then replaces the original. Only the audio stream of the input is mapped, so an
/// existing embedded picture is always replaced.
pub struct FfmpegTagWriter {
    binary_path: PathBuf,
}

impl FfmpegTagWriter {
    /// Create a writer with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Use the configured binary, falling back to PATH when allowed
    pub fn from_config(config: &Config) -> Option<Self> {
        match &config.tools.ffmpeg_path {
            Some(path) => Some(Self::new(path.clone())),
            None if config.tools.search_path => Self::from_path(),
            None => None,
        }
    }
}

fn sibling(path: &Path, infix: &str, extension: &str) -> PathBuf {
    let mut name: OsString = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(infix);
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

/// ffmpeg arguments that write `tags` (and an optional cover input) to `output`
fn build_args(input: &Path, cover: Option<&Path>, tags: &AudioTags, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-y".into(), "-loglevel".into(), "error".into()];
    args.push("-i".into());
    args.push(input.into());
    if let Some(cover) = cover {
        args.push("-i".into());
        args.push(cover.into());
    }

    args.extend(["-map".into(), "0:a".into()]);
    if cover.is_some() {
        args.extend(["-map".into(), "1:0".into()]);
    }
    args.extend([
        "-c".into(),
        "copy".into(),
        "-map_metadata".into(),
        "0".into(),
        "-id3v2_version".into(),
        "3".into(),
    ]);

    let mut metadata = |key: &str, value: &str| {
        args.push("-metadata".into());
        args.push(format!("{key}={value}").into());
    };
    metadata("title", &tags.title);
    if let Some(artist) = &tags.artist {
        metadata("artist", artist);
    }
    if let Some(album) = &tags.album {
        metadata("album", album);
    }
    if let Some(date) = &tags.date {
        metadata("date", date);
    }

    if cover.is_some() {
        args.extend([
            "-metadata:s:v".into(),
            "title=Album cover".into(),
            "-metadata:s:v".into(),
            "comment=Cover (front)".into(),
            "-disposition:v".into(),
            "attached_pic".into(),
        ]);
    }

    args.push(output.into());
    args
}

#[async_trait]
impl TagWriter for FfmpegTagWriter {
    async fn write_tags(
        &self,
        path: &Path,
        tags: &AudioTags,
        cover: Option<&[u8]>,
    ) -> Result<()> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp3".to_string());
        let tmp_output = sibling(path, ".tagging", &extension);

        let cover_path = match cover {
            Some(bytes) => {
                let cover_path = sibling(path, ".cover", "jpg");
                tokio::fs::write(&cover_path, bytes).await?;
                Some(cover_path)
            }
            None => None,
        };

        let args = build_args(path, cover_path.as_deref(), tags, &tmp_output);
        let result = Command::new(&self.binary_path).args(&args).output().await;

        if let Some(cover_path) = &cover_path {
            tokio::fs::remove_file(cover_path).await.ok();
        }

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                tokio::fs::remove_file(&tmp_output).await.ok();
                return Err(Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)));
            }
        };

        if !output.status.success() {
            tokio::fs::remove_file(&tmp_output).await.ok();
            return Err(Error::ExternalTool(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tokio::fs::rename(&tmp_output, path).await?;
        tracing::debug!(path = %path.display(), cover = cover.is_some(), "Embedded tags");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn tags() -> AudioTags {
        AudioTags {
            title: "第1集".to_string(),
            artist: Some("someone".to_string()),
            album: None,
            date: Some("20240101".to_string()),
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn args_without_cover_copy_audio_only() {
        let args = strings(&build_args(
            Path::new("/out/a.mp3"),
            None,
            &tags(),
            Path::new("/out/a.tagging.mp3"),
        ));

        assert!(args.windows(2).any(|w| w == ["-map", "0:a"]));
        assert!(!args.iter().any(|a| a == "1:0"));
        assert!(args.windows(2).any(|w| w == ["-metadata", "title=第1集"]));
        assert!(args.windows(2).any(|w| w == ["-metadata", "artist=someone"]));
        assert!(!args.iter().any(|a| a.starts_with("album=")));
        assert!(args.windows(2).any(|w| w == ["-id3v2_version", "3"]));
        assert_eq!(args.last().unwrap(), "/out/a.tagging.mp3");
    }

    #[test]
    fn args_with_cover_attach_picture() {
        let args = strings(&build_args(
            Path::new("/out/a.mp3"),
            Some(Path::new("/out/a.cover.jpg")),
            &tags(),
            Path::new("/out/a.tagging.mp3"),
        ));

        assert!(args.windows(2).any(|w| w == ["-i", "/out/a.cover.jpg"]));
        assert!(args.windows(2).any(|w| w == ["-map", "1:0"]));
        assert!(args.windows(2).any(|w| w == ["-disposition:v", "attached_pic"]));
    }

    #[test]
    fn sibling_keeps_directory() {
        assert_eq!(
            sibling(Path::new("/out/book-1.mp3"), ".tagging", "mp3"),
            PathBuf::from("/out/book-1.tagging.mp3")
        );
    }

    #[test]
    fn from_config_uses_explicit_path() {
        let mut config = Config::default();
        config.tools.ffmpeg_path = Some(PathBuf::from("/opt/ffmpeg"));
        let writer = FfmpegTagWriter::from_config(&config).unwrap();
        assert_eq!(writer.binary_path, PathBuf::from("/opt/ffmpeg"));

        config.tools.ffmpeg_path = None;
        config.tools.search_path = false;
        assert!(FfmpegTagWriter::from_config(&config).is_none());
    }

    #[tokio::test]
    async fn missing_binary_is_an_error_and_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("a.mp3");
        std::fs::write(&audio, b"ID3fake").unwrap();

        let writer = FfmpegTagWriter::new(PathBuf::from("/nonexistent/ffmpeg-xyz"));
        let err = writer
            .write_tags(&audio, &tags(), Some(&b"jpeg"[..]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExternalTool(_)));
        assert_eq!(std::fs::read(&audio).unwrap(), b"ID3fake");
        assert!(!dir.path().join("a.cover.jpg").exists());
    }
}
