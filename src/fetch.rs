use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, RgbImage};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::config::FetchCfg;

/// Decoded RGB pixel buffer. Lives only until its hash is computed.
pub struct ImageBitmap(RgbImage);

impl ImageBitmap {
    pub fn from_rgb(img: RgbImage) -> Self {
        Self(img)
    }

    /// Decode any raster format the image crate recognises.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes).context("undecodable image body")?;
        Ok(Self(img.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.0)
    }
}

/// Turns a URL into a bitmap, or `None` when the image is unavailable for any reason.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<ImageBitmap>;
}

/// Single-attempt HTTP fetcher with a bounded timeout and a browser user agent.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchCfg) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .user_agent(cfg.user_agent.clone())
            .build()
            .context("building image http client")?;
        Ok(Self { client, max_bytes: cfg.max_bytes })
    }

    async fn try_fetch(&self, url: &str) -> Result<ImageBitmap> {
        let resp = self.client.get(url).send().await?.error_for_status()?;

        if let Some(ct) = resp.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
            if ct.trim_start().to_ascii_lowercase().starts_with("text/") {
                bail!("non-image content type {ct}");
            }
        }
        if let Some(len) = resp.content_length() {
            if len as usize > self.max_bytes {
                bail!("body of {len} bytes exceeds limit");
            }
        }

        let bytes = resp.bytes().await?;
        if bytes.len() > self.max_bytes {
            bail!("body of {} bytes exceeds limit", bytes.len());
        }

        // Decoding is CPU bound; keep it off the async workers.
        tokio::task::spawn_blocking(move || ImageBitmap::decode(&bytes)).await?
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<ImageBitmap> {
        match self.try_fetch(url).await {
            Ok(bitmap) => Some(bitmap),
            Err(e) => {
                debug!(url, error = %e, "image unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use super::ImageBitmap;
    use image::{Rgb, RgbImage};

    /// Gradient sky with a dark tower on the left third.
    pub fn landmark(w: u32, h: u32) -> ImageBitmap {
        let img = RgbImage::from_fn(w, h, |x, y| {
            let in_tower = x > w / 6 && x < w / 3 && y > h / 5;
            if in_tower {
                Rgb([30, 30, 40])
            } else {
                let v = (x * 255 / w.max(1)) as u8;
                Rgb([v, v / 2 + 100, 220])
            }
        });
        ImageBitmap::from_rgb(img)
    }

    /// Four-by-four board of black and white squares.
    pub fn checkerboard(w: u32, h: u32) -> ImageBitmap {
        let img = RgbImage::from_fn(w, h, |x, y| {
            let cell = (x * 4 / w.max(1) + y * 4 / h.max(1)) % 2;
            if cell == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        });
        ImageBitmap::from_rgb(img)
    }

    pub fn solid(w: u32, h: u32) -> ImageBitmap {
        ImageBitmap::from_rgb(RgbImage::from_pixel(w, h, Rgb([128, 128, 128])))
    }
}
