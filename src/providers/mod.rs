//! Image search providers.
//!
//! Each provider turns a text query into a flat list of image URLs. Response
//! shapes differ wildly between services; the adapters flatten them here so
//! the consensus filter never sees anything but URLs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{AppCfg, DEFAULT_USER_AGENT};

mod pexels;
mod tripadvisor;
mod wikipedia;

pub use pexels::PexelsProvider;
pub use tripadvisor::TripAdvisorProvider;
pub use wikipedia::WikipediaProvider;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("missing credentials: set {0}")]
    MissingKey(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str) -> Result<Vec<String>, ProviderError>;
}

/// A provider together with the cap applied to its filtered results.
#[derive(Clone)]
pub struct ProviderSlot {
    pub provider: Arc<dyn ImageProvider>,
    pub max_keep: Option<usize>,
}

/// Passes 2xx responses through and turns anything else into `ProviderError::Status`.
pub(crate) fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(ProviderError::Status(status))
    }
}

/// Reads an API key from the named env var; blank values count as missing.
pub(crate) fn key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn provider_client(cfg: &AppCfg) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.providers.timeout_secs.unwrap_or(15)))
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .context("building provider http client")
}

/// Builds every enabled provider, in display order.
pub fn build_providers(cfg: &AppCfg) -> Result<Vec<ProviderSlot>> {
    let client = provider_client(cfg)?;
    let p = &cfg.providers;
    let mut slots = Vec::new();
    if p.pexels.enabled {
        slots.push(ProviderSlot {
            provider: Arc::new(PexelsProvider::from_cfg(client.clone(), &p.pexels)),
            max_keep: p.pexels.max_keep,
        });
    }
    if p.tripadvisor.enabled {
        slots.push(ProviderSlot {
            provider: Arc::new(TripAdvisorProvider::from_cfg(client.clone(), &p.tripadvisor)),
            max_keep: p.tripadvisor.max_keep,
        });
    }
    if p.wikipedia.enabled {
        slots.push(ProviderSlot {
            provider: Arc::new(WikipediaProvider::from_cfg(client, &p.wikipedia)),
            max_keep: p.wikipedia.max_keep,
        });
    }
    Ok(slots)
}
