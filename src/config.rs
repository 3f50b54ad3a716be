//! Configuration types for bili-audio-dl

use crate::title_filter::TitleFilter;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for [`AudioDownloader`](crate::AudioDownloader)
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig) - output root, concurrency, audio format
/// - [`persistence`](PersistenceConfig) - task state and history files
/// - [`executor`](ExecutorConfig) - error budget, backoff, polling
/// - [`retry`](RetryConfig) - HTTP lookup retries
/// - [`cover`](CoverConfig) - cover art output
/// - [`tools`](ToolsConfig) - external binaries
/// - [`platform`](PlatformConfig) - remote platform endpoints
/// - [`title_filter`](TitleFilter) - display title cleanup
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Persisted state locations
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Per-task execution settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Retry settings for metadata lookups
    #[serde(default)]
    pub retry: RetryConfig,

    /// Cover art settings
    #[serde(default)]
    pub cover: CoverConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Remote platform settings
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Display title filter rules
    #[serde(default)]
    pub title_filter: TitleFilter,
}

impl Config {
    /// Download root directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }
}

/// Download behavior configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root directory task output directories are created under (default: "./audiobooks")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum tasks executing at once (default: 3)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_tasks: usize,

    /// Tasks that may wait for a worker before submissions are rejected (default: 64)
    #[serde(default = "default_admission_capacity")]
    pub admission_queue_capacity: usize,

    /// Target audio codec/extension (default: "mp3")
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Target audio quality passed to the transcoder (default: "192K")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// Intermediate file suffixes removed next to a finished artifact
    #[serde(default = "default_intermediate_suffixes")]
    pub intermediate_suffixes: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_tasks: default_max_concurrent(),
            admission_queue_capacity: default_admission_capacity(),
            audio_format: default_audio_format(),
            audio_quality: default_audio_quality(),
            intermediate_suffixes: default_intermediate_suffixes(),
        }
    }
}

/// Persisted state locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Aggregate task registry file (default: "./download_tasks/active_tasks.json")
    #[serde(default = "default_task_state_path")]
    pub task_state_path: PathBuf,

    /// History ledger file (default: "./download_history/history.json")
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            task_state_path: default_task_state_path(),
            history_path: default_history_path(),
        }
    }
}

/// Per-task execution settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Errors a task may accumulate before it fails (default: 5)
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,

    /// Backoff unit; the wait before a retry is `backoff_base * error_count` (default: 5s)
    #[serde(default = "default_backoff_base", with = "duration_serde")]
    pub backoff_base: Duration,

    /// How long to wait for a finished artifact to become readable (default: 30s)
    #[serde(default = "default_artifact_timeout", with = "duration_serde")]
    pub artifact_timeout: Duration,

    /// Poll interval while waiting for an artifact (default: 1s)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Capacity of the per-part progress channel (default: 32)
    #[serde(default = "default_progress_capacity")]
    pub progress_channel_capacity: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
            backoff_base: default_backoff_base(),
            artifact_timeout: default_artifact_timeout(),
            poll_interval: default_poll_interval(),
            progress_channel_capacity: default_progress_capacity(),
        }
    }
}

/// Retry configuration for transient failures of metadata lookups
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Cover art output settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoverConfig {
    /// Output edge length in pixels (default: 400)
    #[serde(default = "default_cover_size")]
    pub size: u32,

    /// JPEG quality (default: 95)
    #[serde(default = "default_cover_quality")]
    pub jpeg_quality: u8,

    /// Gaussian blur radius applied to the margins (default: 10.0)
    #[serde(default = "default_blur_radius")]
    pub blur_radius: f32,
}

impl Default for CoverConfig {
    fn default() -> Self {
        Self {
            size: default_cover_size(),
            jpeg_quality: default_cover_quality(),
            blur_radius: default_blur_radius(),
        }
    }
}

/// External tool paths
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Retries performed by the transfer tool itself (default: 3)
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_path: None,
            search_path: true,
            transport_retries: default_transport_retries(),
        }
    }
}

/// Remote platform settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Video page base URL; `{video_base_url}{video_id}?p={page}` addresses a part
    #[serde(default = "default_video_base_url")]
    pub video_base_url: String,

    /// API base URL used for collection listing
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Page size for collection listing (default: 30)
    #[serde(default = "default_collection_page_size")]
    pub collection_page_size: u32,

    /// User-Agent header sent with HTTP requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Referer header sent with HTTP requests
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Timeout for a single HTTP request (default: 30s)
    #[serde(default = "default_http_timeout", with = "duration_serde")]
    pub http_timeout: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            video_base_url: default_video_base_url(),
            api_base_url: default_api_base_url(),
            collection_page_size: default_collection_page_size(),
            user_agent: default_user_agent(),
            referer: default_referer(),
            http_timeout: default_http_timeout(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./audiobooks")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_admission_capacity() -> usize {
    64
}

fn default_audio_format() -> String {
    "mp3".to_string()
}

fn default_audio_quality() -> String {
    "192K".to_string()
}

fn default_intermediate_suffixes() -> Vec<String> {
    vec![
        ".info.json".to_string(),
        ".m4a".to_string(),
        ".webm".to_string(),
        ".part".to_string(),
        ".ytdl".to_string(),
    ]
}

fn default_task_state_path() -> PathBuf {
    PathBuf::from("./download_tasks/active_tasks.json")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("./download_history/history.json")
}

fn default_max_errors() -> u32 {
    5
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(5)
}

fn default_artifact_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_progress_capacity() -> usize {
    32
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_cover_size() -> u32 {
    400
}

fn default_cover_quality() -> u8 {
    95
}

fn default_blur_radius() -> f32 {
    10.0
}

fn default_transport_retries() -> u32 {
    3
}

fn default_video_base_url() -> String {
    "https://www.bilibili.com/video/".to_string()
}

fn default_api_base_url() -> String {
    "https://api.bilibili.com".to_string()
}

fn default_collection_page_size() -> u32 {
    30
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_referer() -> String {
    "https://www.bilibili.com".to_string()
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(
                "duration must be a non-negative number of seconds",
            ));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
