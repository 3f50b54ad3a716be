//! Cover art compositing
//!
//! Turns an arbitrary-aspect thumbnail into a square JPEG suitable for embedding:
//!
//! 1. Center the source on a white `long_side x long_side` canvas
//! 2. Fill the margins by repeating the source's outermost row/column
//! 3. Gaussian-blur the canvas and keep the blurred pixels only in the margins
//! 4. Resize to the configured edge (Lanczos3) and encode as JPEG
//!
//! Any failure yields "no cover"; a missing cover never fails a part.

use crate::config::{Config, CoverConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::retry::fetch_with_retry;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};

/// A source image centered on a square canvas with edge-extended margins
#[derive(Clone, Debug)]
pub struct SquareCanvas {
    /// The square canvas
    pub canvas: RgbImage,
    /// Left edge of the source footprint
    pub offset_x: u32,
    /// Top edge of the source footprint
    pub offset_y: u32,
    /// Width of the source footprint
    pub width: u32,
    /// Height of the source footprint
    pub height: u32,
}

impl SquareCanvas {
    /// Whether `(x, y)` lies inside the original image's footprint
    pub fn in_footprint(&self, x: u32, y: u32) -> bool {
        x >= self.offset_x
            && x < self.offset_x + self.width
            && y >= self.offset_y
            && y < self.offset_y + self.height
    }
}

/// Center `source` on a square canvas and edge-extend it into the margins
pub fn square_canvas(source: &RgbImage) -> SquareCanvas {
    let (width, height) = source.dimensions();
    let long_side = width.max(height);
    let offset_x = (long_side - width) / 2;
    let offset_y = (long_side - height) / 2;

    let mut canvas = RgbImage::from_pixel(long_side, long_side, Rgb([255, 255, 255]));
    imageops::replace(&mut canvas, source, i64::from(offset_x), i64::from(offset_y));

    if width > 0 && height > 0 {
        if width < long_side {
            for y in 0..height {
                let left = *source.get_pixel(0, y);
                let right = *source.get_pixel(width - 1, y);
                for x in 0..offset_x {
                    canvas.put_pixel(x, offset_y + y, left);
                }
                for x in offset_x + width..long_side {
                    canvas.put_pixel(x, offset_y + y, right);
                }
            }
        }
        if height < long_side {
            for x in 0..width {
                let top = *source.get_pixel(x, 0);
                let bottom = *source.get_pixel(x, height - 1);
                for y in 0..offset_y {
                    canvas.put_pixel(offset_x + x, y, top);
                }
                for y in offset_y + height..long_side {
                    canvas.put_pixel(offset_x + x, y, bottom);
                }
            }
        }
    }

    SquareCanvas {
        canvas,
        offset_x,
        offset_y,
        width,
        height,
    }
}

/// Blur the whole canvas and take blurred pixels only outside the footprint
pub fn blur_margins(square: &SquareCanvas, radius: f32) -> RgbImage {
    if square.width == square.height {
        return square.canvas.clone();
    }

    let blurred = imageops::blur(&square.canvas, radius);
    let mut out = square.canvas.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if !square.in_footprint(x, y) {
            *pixel = *blurred.get_pixel(x, y);
        }
    }
    out
}

/// Produces embeddable cover art from thumbnails
pub struct CoverCompositor {
    config: CoverConfig,
    retry: RetryConfig,
    client: reqwest::Client,
}

impl CoverCompositor {
    /// Build a compositor with an HTTP client using the platform's headers
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let referer = HeaderValue::from_str(&config.platform.referer).map_err(|e| Error::Config {
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
            config: config.cover.clone(),
            retry: config.retry.clone(),
            client,
        })
    }

    /// Download the thumbnail at `url` and compose it; `None` on any failure
    pub async fn fetch_and_compose(&self, url: &str) -> Option<Vec<u8>> {
        let bytes = match self.fetch(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to fetch thumbnail, continuing without cover");
                return None;
            }
        };

        let config = self.config.clone();
        match tokio::task::spawn_blocking(move || compose_with(&config, &bytes)).await {
            Ok(Ok(cover)) => Some(cover),
            Ok(Err(e)) => {
                tracing::warn!(url, error = %e, "Failed to compose cover, continuing without cover");
                None
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Cover composition task panicked");
                None
            }
        }
    }

    /// Compose already-downloaded image bytes into a square JPEG
    pub fn compose(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        compose_with(&self.config, bytes)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let client = &self.client;
        fetch_with_retry(&self.retry, || async move {
            let response = client.get(url).send().await?.error_for_status()?;
            Ok::<_, Error>(response.bytes().await?.to_vec())
        })
        .await
    }
}

fn compose_with(config: &CoverConfig, bytes: &[u8]) -> Result<Vec<u8>> {
    let source = image::load_from_memory(bytes)?.to_rgb8();
    if source.width() == 0 || source.height() == 0 {
        return Err(Error::Other("thumbnail has no pixels".to_string()));
    }

    let square = square_canvas(&source);
    tracing::debug!(
        width = square.width,
        height = square.height,
        side = square.canvas.width(),
        "Squared cover image"
    );

    let finished = blur_margins(&square, config.blur_radius);
    let resized = imageops::resize(&finished, config.size, config.size, FilterType::Lanczos3);

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, config.jpeg_quality).encode_image(&resized)?;
    Ok(out)
}
