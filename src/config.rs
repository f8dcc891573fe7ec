use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::consensus::ConsensusParams;
use crate::fingerprint::HashAlgorithm;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko)";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchCfg {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Upper bound on simultaneous image downloads per filter pass.
    pub concurrency: usize,
    pub max_bytes: usize,
}

impl Default for FetchCfg {
    fn default() -> Self {
        Self {
            timeout_secs: 12,
            user_agent: DEFAULT_USER_AGENT.into(),
            concurrency: 6,
            max_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintCfg {
    pub algorithm: HashAlgorithm,
    pub hash_size: u32,
}

impl Default for FingerprintCfg {
    fn default() -> Self {
        Self { algorithm: HashAlgorithm::Perceptual, hash_size: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCfg {
    pub enabled: bool,
    pub ttl_secs: u64,
}

impl Default for CacheCfg {
    fn default() -> Self {
        Self { enabled: true, ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PexelsCfg {
    pub enabled: bool,
    pub api_key_env: String,
    pub per_page: u32,
    pub max_keep: Option<usize>,
    pub base_url: String,
}

impl Default for PexelsCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "PEXELS_API_KEY".into(),
            per_page: 10,
            max_keep: Some(5),
            base_url: "https://api.pexels.com".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TripAdvisorCfg {
    pub enabled: bool,
    pub api_key_env: String,
    /// Optional env var holding the app origin sent as Referer/Origin.
    pub referer_env: String,
    pub max_results: usize,
    pub max_keep: Option<usize>,
    pub base_url: String,
}

impl Default for TripAdvisorCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: "TRIPADVISOR_API_KEY".into(),
            referer_env: "TA_REFERER".into(),
            max_results: 18,
            max_keep: Some(18),
            base_url: "https://api.content.tripadvisor.com".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WikipediaCfg {
    pub enabled: bool,
    pub limit: u32,
    pub max_keep: Option<usize>,
    pub base_url: String,
}

impl Default for WikipediaCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 10,
            max_keep: Some(10),
            base_url: "https://en.wikipedia.org".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersCfg {
    pub timeout_secs: Option<u64>,
    pub pexels: PexelsCfg,
    pub tripadvisor: TripAdvisorCfg,
    pub wikipedia: WikipediaCfg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttractionsCfg {
    pub enabled: bool,
    pub api_key_env: String,
    pub model: String,
    pub max_items: usize,
    pub max_tokens: u32,
    pub base_url: String,
}

impl Default for AttractionsCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: "OPENAI_API_KEY".into(),
            model: "gpt-4o-mini".into(),
            max_items: 10,
            max_tokens: 400,
            base_url: "https://api.openai.com".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppCfg {
    pub fetch: FetchCfg,
    pub fingerprint: FingerprintCfg,
    pub consensus: ConsensusParams,
    pub cache: CacheCfg,
    pub providers: ProvidersCfg,
    pub attractions: AttractionsCfg,
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl AppCfg {
    pub fn from_yaml(txt: &str) -> Result<Self> {
        serde_yaml::from_str(txt).context("Failed to parse config YAML")
    }

    /// Reads the YAML file when given (a missing path is an error), applies
    /// environment overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let txt = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {}", p.display()))?;
                Self::from_yaml(&txt)?
            }
            None => Self::default(),
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Some(v) = env_parse("PLACELENS_CONCURRENCY") {
            self.fetch.concurrency = v;
        }
        if let Some(v) = env_parse("PLACELENS_FETCH_TIMEOUT_SECS") {
            self.fetch.timeout_secs = v;
        }
        if let Some(v) = env_parse("PLACELENS_PERCENTILE") {
            self.consensus.percentile = v;
        }
        if let Some(v) = env_parse("PLACELENS_FLOOR_FRACTION") {
            self.consensus.floor_fraction = v;
        }
        if let Some(v) = env_parse("PLACELENS_CACHE_TTL_SECS") {
            self.cache.ttl_secs = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            bail!("fetch.concurrency must be greater than 0");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be greater than 0");
        }
        if !(0.0..=100.0).contains(&self.consensus.percentile) {
            bail!("consensus.percentile must be within 0..=100, got {}", self.consensus.percentile);
        }
        if !(0.0..=1.0).contains(&self.consensus.floor_fraction) {
            bail!(
                "consensus.floor_fraction must be within 0..=1, got {}",
                self.consensus.floor_fraction
            );
        }
        if self.fingerprint.hash_size < 2 {
            bail!("fingerprint.hash_size must be at least 2");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = AppCfg::from_yaml("{}").unwrap();
        assert_eq!(cfg.fetch.timeout_secs, 12);
        assert_eq!(cfg.fetch.concurrency, 6);
        assert_eq!(cfg.consensus, ConsensusParams::default());
        assert_eq!(cfg.providers.pexels.max_keep, Some(5));
        assert_eq!(cfg.providers.tripadvisor.max_results, 18);
        assert!(!cfg.attractions.enabled);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = AppCfg::from_yaml(
            "consensus:\n  percentile: 90\n\
             fingerprint:\n  algorithm: double_gradient\n\
             providers:\n  wikipedia:\n    enabled: false\n",
        )
        .unwrap();
        assert_eq!(cfg.consensus.percentile, 90.0);
        assert_eq!(cfg.consensus.floor_fraction, 0.7);
        assert_eq!(cfg.fingerprint.algorithm, HashAlgorithm::DoubleGradient);
        assert_eq!(cfg.fingerprint.hash_size, 8);
        assert!(!cfg.providers.wikipedia.enabled);
        assert!(cfg.providers.pexels.enabled);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut cfg = AppCfg::default();
        cfg.consensus.percentile = 120.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppCfg::default();
        cfg.consensus.floor_fraction = -0.1;
        assert!(cfg.validate().is_err());

        let mut cfg = AppCfg::default();
        cfg.fetch.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn example_config_parses() {
        let cfg = AppCfg::from_yaml(include_str!("../placelens.example.yaml")).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.providers.timeout_secs, Some(15));
        assert_eq!(cfg.providers.pexels.per_page, 10);
        assert_eq!(cfg.providers.tripadvisor.referer_env, "TA_REFERER");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = AppCfg::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config file"));
    }
}
