use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;

use super::{check_status, key_from_env, ImageProvider, ProviderError};
use crate::config::PexelsCfg;

/// Stock-photo search.
pub struct PexelsProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    key_env: String,
    per_page: u32,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResp {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    #[serde(default)]
    src: PhotoSrc,
}

#[derive(Deserialize, Default)]
struct PhotoSrc {
    large2x: Option<String>,
    large: Option<String>,
    medium: Option<String>,
    original: Option<String>,
}

impl PexelsProvider {
    pub fn new(client: reqwest::Client, api_key: Option<String>, per_page: u32) -> Self {
        Self {
            client,
            api_key,
            key_env: "PEXELS_API_KEY".into(),
            per_page,
            base_url: "https://api.pexels.com".into(),
        }
    }

    pub fn from_cfg(client: reqwest::Client, cfg: &PexelsCfg) -> Self {
        Self {
            client,
            api_key: key_from_env(&cfg.api_key_env),
            key_env: cfg.api_key_env.clone(),
            per_page: cfg.per_page,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Largest rendition each photo offers, skipping photos with none.
fn photo_urls(resp: SearchResp) -> Vec<String> {
    resp.photos
        .into_iter()
        .filter_map(|p| {
            let src = p.src;
            src.large2x.or(src.large).or(src.medium).or(src.original)
        })
        .filter(|u| !u.is_empty())
        .collect()
}

#[async_trait]
impl ImageProvider for PexelsProvider {
    fn name(&self) -> &'static str {
        "pexels"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingKey(self.key_env.clone()))?;
        let per_page = self.per_page.to_string();
        let resp = self
            .client
            .get(format!("{}/v1/search", self.base_url))
            .header(AUTHORIZATION, key)
            .query(&[("query", query), ("per_page", per_page.as_str())])
            .send()
            .await?;
        let resp = check_status(resp)?.json::<SearchResp>().await?;
        Ok(photo_urls(resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_largest_rendition() {
        let resp: SearchResp = serde_json::from_str(
            r#"{"photos":[
                {"src":{"large2x":"https://p/1-2x.jpg","large":"https://p/1-l.jpg"}},
                {"src":{"medium":"https://p/2-m.jpg","original":"https://p/2-o.jpg"}},
                {"src":{}},
                {"id": 4},
                {"src":{"original":"https://p/5-o.jpg"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            photo_urls(resp),
            vec!["https://p/1-2x.jpg", "https://p/2-m.jpg", "https://p/5-o.jpg"]
        );
    }

    #[test]
    fn missing_photos_field_is_empty() {
        let resp: SearchResp = serde_json::from_str(r#"{"total_results":0}"#).unwrap();
        assert!(photo_urls(resp).is_empty());
    }

    #[tokio::test]
    async fn search_without_key_fails_cleanly() {
        let provider = PexelsProvider::new(reqwest::Client::new(), None, 10);
        let err = provider.search("Eiffel Tower").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingKey(ref v) if v == "PEXELS_API_KEY"));
    }
}
