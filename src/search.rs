use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::attractions::AttractionGenerator;
use crate::cache::ResultCache;
use crate::config::AppCfg;
use crate::orchestrator::ConsensusFilter;
use crate::providers::{build_providers, ProviderSlot};

/// One provider's filtered photos for one query.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSection {
    pub provider: String,
    pub query: String,
    /// URLs the provider returned before filtering.
    pub candidates: usize,
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cached: bool,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttractionPhotos {
    pub name: String,
    pub sections: Vec<ProviderSection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaceResult {
    pub place: String,
    pub attractions: Vec<AttractionPhotos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_error: Option<String>,
}

/// Runs every configured provider through the consensus filter.
pub struct PhotoSearch {
    slots: Vec<ProviderSlot>,
    filter: ConsensusFilter,
    cache: Option<ResultCache<ProviderSection>>,
}

impl PhotoSearch {
    pub fn new(
        slots: Vec<ProviderSlot>,
        filter: ConsensusFilter,
        cache: Option<ResultCache<ProviderSection>>,
    ) -> Self {
        Self { slots, filter, cache }
    }

    pub fn from_cfg(cfg: &AppCfg) -> Result<Self> {
        let ttl = Duration::from_secs(cfg.cache.ttl_secs);
        let cache = cfg.cache.enabled.then(|| ResultCache::new(ttl));
        Ok(Self::new(build_providers(cfg)?, ConsensusFilter::from_cfg(cfg)?, cache))
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.provider.name()).collect()
    }

    pub fn filter(&self) -> &ConsensusFilter {
        &self.filter
    }

    /// One section per provider, in configuration order. Providers run
    /// concurrently and a failing one only affects its own section.
    pub async fn search(&self, query: &str) -> Vec<ProviderSection> {
        let query = query.trim();
        join_all(self.slots.iter().map(|slot| self.run_provider(slot, query))).await
    }

    async fn run_provider(&self, slot: &ProviderSlot, query: &str) -> ProviderSection {
        let name = slot.provider.name();
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(query, name)) {
            return ProviderSection { cached: true, ..hit };
        }

        let mut section = ProviderSection {
            provider: name.to_string(),
            query: query.to_string(),
            candidates: 0,
            urls: Vec::new(),
            error: None,
            cached: false,
            fetched_at: Utc::now(),
        };

        match slot.provider.search(query).await {
            Ok(candidates) => {
                section.candidates = candidates.len();
                section.urls = self.filter.filter(&candidates, slot.max_keep).await;
                info!(
                    provider = name,
                    query,
                    candidates = section.candidates,
                    kept = section.urls.len(),
                    "provider done"
                );
                if let Some(cache) = &self.cache {
                    cache.put(query, name, section.clone());
                }
            }
            Err(e) => {
                warn!(provider = name, query, error = %e, "provider search failed");
                section.error = Some(e.to_string());
            }
        }
        section
    }

    /// Generates attractions for `place` and searches each one in turn.
    /// Falls back to the place itself when no names come back.
    pub async fn search_place(
        &self,
        place: &str,
        generator: &dyn AttractionGenerator,
    ) -> PlaceResult {
        let place = place.trim();
        let (names, generator_error) = match generator.attractions(place).await {
            Ok(names) if !names.is_empty() => (names, None),
            Ok(_) => (vec![place.to_string()], Some("no attractions could be parsed".to_string())),
            Err(e) => {
                warn!(
                    generator = generator.name(),
                    place,
                    error = %e,
                    "attraction generation failed"
                );
                (vec![place.to_string()], Some(e.to_string()))
            }
        };

        let mut attractions = Vec::with_capacity(names.len());
        for name in names {
            let sections = self.search(&name).await;
            attractions.push(AttractionPhotos { name, sections });
        }
        PlaceResult { place: place.to_string(), attractions, generator_error }
    }
}
