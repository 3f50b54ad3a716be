//! yt-dlp backed media source

use super::parser::{
    FILEPATH_MARKER, max_page_index, parse_collection_page, parse_filepath_line,
    parse_metadata_json, parse_progress_line,
};
use super::traits::{AcquireRequest, AcquiredArtifact, MediaSource};
use crate::config::{Config, DownloadConfig, PlatformConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use crate::types::{CollectionItem, MediaInfo, PartLocator};
use crate::utils::{file_size, validate_platform_id};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use url::Url;

/// Upper bound on collection pages fetched for one listing
const MAX_COLLECTION_PAGES: u32 = 1000;

/// Bytes of stderr kept for error messages
const STDERR_TAIL: usize = 2000;

/// Media source driving the external `yt-dlp` binary
///
/// Part discovery and collection listing use plain HTTP against the platform;
/// metadata and transfers go through `yt-dlp`.
///
/// # Examples
///
/// ```no_run
/// use bili_audio_dl::config::Config;
/// use bili_audio_dl::media::{MediaSource, YtDlpSource};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = YtDlpSource::from_config(&Config::default())?;
/// let parts = source.count_parts("BV1xx411c7mD").await?;
/// println!("{parts} parts");
/// # Ok(())
/// # }
/// ```
pub struct YtDlpSource {
    binary_path: PathBuf,
    client: reqwest::Client,
    platform: PlatformConfig,
    download: DownloadConfig,
    retry: RetryConfig,
    transport_retries: u32,
}

impl YtDlpSource {
    /// Create a source with an explicit binary path
    pub fn new(binary_path: PathBuf, config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let referer =
            HeaderValue::from_str(&config.platform.referer).map_err(|e| Error::Config {
                message: format!("invalid referer header: {e}"),
                key: Some("platform.referer".to_string()),
            })?;
        headers.insert(REFERER, referer);

        let client = reqwest::Client::builder()
            .user_agent(config.platform.user_agent.clone())
            .default_headers(headers)
            .timeout(config.platform.http_timeout)
            .build()?;

        Ok(Self {
            binary_path,
            client,
            platform: config.platform.clone(),
            download: config.download.clone(),
            retry: config.retry.clone(),
            transport_retries: config.tools.transport_retries,
        })
    }

    /// Create a source using the configured binary, or `yt-dlp` from PATH
    ///
    /// Returns [`Error::NotSupported`] when no binary can be found.
    pub fn from_config(config: &Config) -> Result<Self> {
        let binary = match &config.tools.yt_dlp_path {
            Some(path) => path.clone(),
            None if config.tools.search_path => which::which("yt-dlp")
                .map_err(|_| Error::NotSupported("yt-dlp not found in PATH".to_string()))?,
            None => {
                return Err(Error::NotSupported(
                    "yt-dlp path not configured and PATH search disabled".to_string(),
                ));
            }
        };
        Self::new(binary, config)
    }

    fn video_url(&self, video_id: &str) -> Result<Url> {
        validate_platform_id("video_id", video_id)?;
        Url::parse(&self.platform.video_base_url)
            .and_then(|base| base.join(video_id))
            .map_err(|e| Error::Config {
                message: format!("invalid video URL for {video_id}: {e}"),
                key: Some("platform.video_base_url".to_string()),
            })
    }

    fn part_url(&self, locator: &PartLocator) -> Result<Url> {
        let mut url = self.video_url(&locator.video_id)?;
        url.query_pairs_mut()
            .append_pair("p", &locator.page.to_string());
        Ok(url)
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let client = &self.client;
        fetch_with_retry(&self.retry, || async move {
            let response = client
                .get(url)
                .query(query)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, Error>(response.text().await?)
        })
        .await
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("--no-playlist")
            .arg("--user-agent")
            .arg(&self.platform.user_agent)
            .arg("--referer")
            .arg(&self.platform.referer)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl MediaSource for YtDlpSource {
    async fn count_parts(&self, video_id: &str) -> Result<u32> {
        let url = self.video_url(video_id)?;
        match self.get_text(url.as_str(), &[]).await {
            Ok(html) => {
                let parts = max_page_index(&html).unwrap_or(1).max(1);
                tracing::debug!(video_id, parts, "Resolved part count");
                Ok(parts)
            }
            Err(e) => {
                tracing::warn!(video_id, error = %e, "Failed to resolve part count, assuming one part");
                Ok(1)
            }
        }
    }

    async fn list_collection(
        &self,
        owner_id: &str,
        season_id: &str,
    ) -> Result<Vec<CollectionItem>> {
        let url = format!(
            "{}/x/polymer/web-space/seasons_archives_list",
            self.platform.api_base_url.trim_end_matches('/')
        );
        let page_size = self.platform.collection_page_size.max(1);

        let mut items = Vec::new();
        for page_num in 1..=MAX_COLLECTION_PAGES {
            let query = [
                ("mid", owner_id.to_string()),
                ("season_id", season_id.to_string()),
                ("page_num", page_num.to_string()),
                ("page_size", page_size.to_string()),
            ];
            let body = self.get_text(&url, &query).await?;
            let page = parse_collection_page(body.as_bytes())?;
            let fetched = page.items.len();
            items.extend(page.items);

            if fetched == 0 || items.len() >= page.total as usize {
                break;
            }
        }

        tracing::info!(owner_id, season_id, members = items.len(), "Listed collection");
        Ok(items)
    }

    async fn fetch_metadata(&self, locator: &PartLocator) -> Result<MediaInfo> {
        let output = self
            .base_command()
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg(self.part_url(locator)?.as_str())
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(Error::TransientTransfer(format!(
                "yt-dlp metadata lookup exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        parse_metadata_json(&output.stdout)
    }

    async fn acquire(
        &self,
        request: &AcquireRequest,
        progress: mpsc::Sender<f32>,
    ) -> Result<AcquiredArtifact> {
        let template = match &request.resume_from {
            Some(resume) => {
                let mut stem = resume.path.with_extension("").into_os_string();
                stem.push(".%(ext)s");
                PathBuf::from(stem)
            }
            None => request.output_dir.join("%(title)s.%(ext)s"),
        };

        let mut cmd = self.base_command();
        cmd.arg("-x")
            .arg("--audio-format")
            .arg(&self.download.audio_format)
            .arg("--audio-quality")
            .arg(&self.download.audio_quality)
            .arg("--newline")
            .arg("--progress")
            .arg("--retries")
            .arg(self.transport_retries.to_string())
            // Keeps `*.part` files from earlier failed attempts of the same part
            .arg("--continue")
            .arg("--print")
            .arg(format!("after_move:{FILEPATH_MARKER}%(filepath)s"))
            .arg("-o")
            .arg(&template)
            .arg(self.part_url(&request.locator)?.as_str())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(
            video_id = %request.locator.video_id,
            page = request.locator.page,
            resume = request.resume_from.is_some(),
            "Starting yt-dlp transfer"
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        // `--print` implies `--quiet`, which moves progress lines to stderr
        let (stdout, stderr) = futures::future::join(
            drain_output(child.stdout.take(), progress.clone()),
            drain_output(child.stderr.take(), progress),
        )
        .await;
        let (stdout, stderr) = (stdout?, stderr?);

        let status = child.wait().await?;
        if !status.success() {
            return Err(Error::TransientTransfer(format!(
                "yt-dlp exited with {}: {}",
                status,
                stderr_tail(&stderr.text)
            )));
        }

        let final_path = stdout.final_path.or(stderr.final_path);
        let path = final_path.ok_or_else(|| {
            Error::TransientTransfer("yt-dlp finished without reporting an output file".to_string())
        })?;
        let size = file_size(&path).await.unwrap_or(0);
        let already = request.resume_from.as_ref().map_or(0, |r| r.offset);

        Ok(AcquiredArtifact {
            path,
            bytes_transferred: size.saturating_sub(already),
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// What one output stream of a transfer carried besides progress
#[derive(Default)]
struct StreamOutput {
    final_path: Option<PathBuf>,
    text: Vec<u8>,
}

/// Read a child output stream line by line, forwarding progress as it arrives
async fn drain_output<R>(reader: Option<R>, progress: mpsc::Sender<f32>) -> Result<StreamOutput>
where
    R: AsyncRead + Unpin,
{
    let mut output = StreamOutput::default();
    let Some(reader) = reader else {
        return Ok(output);
    };

    let mut lines = BufReader::new(reader).lines();
    let mut reporting = true;
    while let Some(line) = lines.next_line().await? {
        if let Some(path) = parse_filepath_line(&line) {
            output.final_path = Some(path);
        } else if let Some(percent) = parse_progress_line(&line) {
            // Receiver gone means nobody is aggregating; keep draining the pipe
            if reporting {
                reporting = progress.send(percent).await.is_ok();
            }
        } else {
            output.text.extend_from_slice(line.as_bytes());
            output.text.push(b'\n');
        }
    }
    Ok(output)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text.len().saturating_sub(STDERR_TAIL);
    let start = (start..text.len())
        .find(|i| text.is_char_boundary(*i))
        .unwrap_or(text.len());
    text[start..].to_string()
}
