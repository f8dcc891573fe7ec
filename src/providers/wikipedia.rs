use async_trait::async_trait;
use serde::Deserialize;

use super::{check_status, ImageProvider, ProviderError};
use crate::config::WikipediaCfg;

/// Lead images of encyclopedia articles matching the query. Needs no key.
pub struct WikipediaProvider {
    client: reqwest::Client,
    limit: u32,
    base_url: String,
}

#[derive(Deserialize, Default)]
struct QueryResp {
    #[serde(default)]
    query: Option<QueryBody>,
}

#[derive(Deserialize, Default)]
struct QueryBody {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    /// Rank within the search results.
    #[serde(default)]
    index: Option<u32>,
    original: Option<PageImage>,
    thumbnail: Option<PageImage>,
}

#[derive(Deserialize)]
struct PageImage {
    source: String,
}

impl WikipediaProvider {
    pub fn from_cfg(client: reqwest::Client, cfg: &WikipediaCfg) -> Self {
        Self { client, limit: cfg.limit, base_url: cfg.base_url.trim_end_matches('/').to_string() }
    }
}

fn page_urls(resp: QueryResp) -> Vec<String> {
    let mut pages = resp.query.map(|q| q.pages).unwrap_or_default();
    pages.sort_by_key(|p| p.index.unwrap_or(u32::MAX));
    pages
        .into_iter()
        .filter_map(|p| p.original.or(p.thumbnail).map(|img| img.source))
        .filter(|u| !u.is_empty())
        .collect()
}

#[async_trait]
impl ImageProvider for WikipediaProvider {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, ProviderError> {
        let limit = self.limit.to_string();
        let resp = self
            .client
            .get(format!("{}/w/api.php", self.base_url))
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("generator", "search"),
                ("gsrsearch", query),
                ("gsrnamespace", "0"),
                ("gsrlimit", limit.as_str()),
                ("prop", "pageimages"),
                ("piprop", "original|thumbnail"),
                ("pithumbsize", "1024"),
            ])
            .send()
            .await?;
        let resp = check_status(resp)?.json::<QueryResp>().await?;
        Ok(page_urls(resp))
    }
}
