//! # bili-audio-dl
//!
//! Background audio extraction for multi-part videos and creator collections.
//!
//! ## Design Philosophy
//!
//! bili-audio-dl is designed to be:
//! - **Job based** - Every submission becomes a task that runs in the background
//! - **Idempotent** - A history ledger skips parts that are already on disk and resumes
//!   truncated ones
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to events or poll task status
//!
//! ## Quick Start
//!
//! ```no_run
//! use bili_audio_dl::{AudioDownloader, Config, TaskSpec, TaskState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = AudioDownloader::new(Config::default()).await?;
//!
//!     let id = downloader
//!         .create_task(TaskSpec::collection("1567748478", "1713211", "three-body"))
//!         .await?;
//!
//!     loop {
//!         let status = downloader.get_status(&id).await?;
//!         println!("{}: {:.1}%", status.status, status.progress);
//!         if status.status.is_terminal() {
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     }
//!
//!     downloader.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Cover art compositing
pub mod cover;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Download history ledger
pub mod history;
/// External media capabilities (yt-dlp, ffmpeg)
pub mod media;
/// Persistent task registry
pub mod registry;
/// Retry logic with exponential backoff
pub mod retry;
/// Display title cleanup
pub mod title_filter;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use cover::CoverCompositor;
pub use downloader::AudioDownloader;
pub use error::{Error, Result};
pub use history::{HistoryEntry, HistoryLedger, LedgerLookup};
pub use media::{
    AcquireRequest, AcquiredArtifact, AudioTags, FfmpegTagWriter, MediaSource, MetadataEmbedder,
    NoOpTagWriter, ResumePoint, TagWriter, YtDlpSource,
};
pub use registry::TaskRegistry;
pub use title_filter::{ReplaceRule, TitleFilter};
pub use types::{
    CollectionItem, Event, MediaInfo, PartLocator, ProgressEvent, ProgressStatus, Task, TaskId,
    TaskSource, TaskSpec, TaskState, TaskStatusView,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bili_audio_dl::{AudioDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = AudioDownloader::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: AudioDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
