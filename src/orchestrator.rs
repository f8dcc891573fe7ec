use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};

use crate::config::AppCfg;
use crate::consensus::{self, ConsensusParams};
use crate::distance::DistanceMatrix;
use crate::fetch::{HttpFetcher, ImageFetcher};
use crate::fingerprint::{PerceptualHash, PerceptualHasher};

/// Visual consensus filter over one provider's candidate URLs.
///
/// Every call is self-contained: candidates are fetched and hashed on a
/// bounded worker pool, compared pairwise, and reduced to the images that
/// agree with the group's medoid. Failures only ever drop the failing
/// candidate.
pub struct ConsensusFilter {
    fetcher: Arc<dyn ImageFetcher>,
    hasher: PerceptualHasher,
    params: ConsensusParams,
    concurrency: usize,
}

impl ConsensusFilter {
    pub fn new(
        fetcher: Arc<dyn ImageFetcher>,
        hasher: PerceptualHasher,
        params: ConsensusParams,
        concurrency: usize,
    ) -> Self {
        Self { fetcher, hasher, params, concurrency: concurrency.max(1) }
    }

    pub fn from_cfg(cfg: &AppCfg) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&cfg.fetch)?);
        Ok(Self::new(
            fetcher,
            PerceptualHasher::from_cfg(&cfg.fingerprint),
            cfg.consensus,
            cfg.fetch.concurrency,
        ))
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Returns the kept URLs in first-appearance order, at most `max_keep` of them.
    pub async fn filter(&self, urls: &[String], max_keep: Option<usize>) -> Vec<String> {
        let candidates = distinct_candidates(urls);
        if candidates.is_empty() {
            return Vec::new();
        }

        let targets: Vec<String> = candidates.iter().map(|u| u.trim().to_string()).collect();
        let slots = self.fingerprint_all(&targets).await;
        let (valid, hashes): (Vec<&String>, Vec<PerceptualHash>) = candidates
            .iter()
            .zip(slots)
            .filter_map(|(&url, hash)| hash.map(|h| (url, h)))
            .unzip();

        let matrix = DistanceMatrix::build(&hashes);
        let selection = consensus::select(&matrix, &self.params, max_keep);

        info!(
            candidates = candidates.len(),
            valid = valid.len(),
            kept = selection.kept.len(),
            medoid = ?selection.medoid,
            threshold = ?selection.threshold,
            floor_applied = selection.floor_applied,
            "consensus filter done"
        );

        selection.kept.iter().map(|&i| valid[i].clone()).collect()
    }

    /// Fetches and hashes every URL, returning one slot per input position.
    ///
    /// Dropping the future aborts whatever downloads are still in flight.
    pub async fn fingerprint_all(&self, urls: &[String]) -> Vec<Option<PerceptualHash>> {
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut joinset = JoinSet::new();

        for (idx, url) in urls.iter().enumerate() {
            let permit = match sem.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let fetcher = self.fetcher.clone();
            let hasher = self.hasher;
            let url = url.clone();

            joinset.spawn(async move {
                let _permit = permit;

                let Some(bitmap) = fetcher.fetch(&url).await else {
                    return (idx, None);
                };
                let hash = match tokio::task::spawn_blocking(move || hasher.hash(bitmap)).await {
                    Ok(hash) => hash,
                    Err(e) => {
                        debug!(url = %url, error = %e, "hashing worker failed");
                        None
                    }
                };
                if hash.is_none() {
                    debug!(url = %url, "image could not be fingerprinted");
                }
                (idx, hash)
            });
        }

        let mut slots: Vec<Option<PerceptualHash>> = vec![None; urls.len()];
        while let Some(res) = joinset.join_next().await {
            match res {
                Ok((idx, hash)) => slots[idx] = hash,
                Err(e) => warn!(error = %e, "fingerprint task failed"),
            }
        }
        slots
    }
}

/// Drops blank entries and repeats of an earlier URL, comparing trimmed text.
/// The caller's strings come back untouched.
fn distinct_candidates(urls: &[String]) -> Vec<&String> {
    let mut seen = HashSet::new();
    urls.iter()
        .filter(|&u| {
            let key = u.trim();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}
