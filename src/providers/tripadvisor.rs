use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER};
use serde_json::Value;
use tracing::warn;

use super::{check_status, key_from_env, ImageProvider, ProviderError};
use crate::config::TripAdvisorCfg;

/// Never query photos for more than this many matched locations.
const MAX_LOCATIONS: usize = 10;

/// Crowd-sourced review photos. A query matches locations; photos are then
/// pulled per location and spread so the total stays near `max_results`.
pub struct TripAdvisorProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    key_env: String,
    referer: Option<String>,
    max_results: usize,
    base_url: String,
}

impl TripAdvisorProvider {
    pub fn from_cfg(client: reqwest::Client, cfg: &TripAdvisorCfg) -> Self {
        Self {
            client,
            api_key: key_from_env(&cfg.api_key_env),
            key_env: cfg.api_key_env.clone(),
            referer: key_from_env(&cfg.referer_env),
            max_results: cfg.max_results,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        if let Some(origin) = self.referer.as_deref().and_then(|r| HeaderValue::from_str(r).ok()) {
            h.insert(REFERER, origin.clone());
            h.insert(ORIGIN, origin);
        }
        h
    }

    async fn location_ids(
        &self,
        key: &str,
        query: &str,
    ) -> Result<Vec<Option<String>>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/api/v1/location/search", self.base_url))
            .headers(self.headers())
            .query(&[("key", key), ("searchQuery", query), ("language", "en")])
            .send()
            .await?;
        let body: Value = check_status(resp)?.json().await?;
        let locations = match body.get("data") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(ProviderError::Decode(format!("location data is not a list: {other}")))
            }
        };
        Ok(locations.iter().map(location_id).collect())
    }

    /// Photos for one location; a failing location yields nothing rather than an error.
    async fn location_photos(&self, key: &str, loc_id: &str, limit: usize) -> Vec<Value> {
        let limit = limit.to_string();
        let resp = self
            .client
            .get(format!("{}/api/v1/location/{loc_id}/photos", self.base_url))
            .headers(self.headers())
            .query(&[("key", key), ("language", "en"), ("limit", limit.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let body: Value = match resp {
            Ok(r) => match r.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(location = loc_id, error = %e, "tripadvisor photos undecodable");
                    return Vec::new();
                }
            },
            Err(e) => {
                warn!(location = loc_id, error = %e, "tripadvisor photos request failed");
                return Vec::new();
            }
        };
        match body.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        }
    }
}

fn location_id(loc: &Value) -> Option<String> {
    match loc.get("location_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Splits `max_results` over `locations`, giving the remainder to the first ones.
pub(crate) fn per_location_counts(max_results: usize, locations: usize) -> Vec<usize> {
    if locations == 0 {
        return Vec::new();
    }
    let base = max_results / locations;
    let rem = max_results % locations;
    (0..locations).map(|i| base + usize::from(i < rem)).collect()
}

/// Best URL for one photo object. `images` comes either keyed by size name or
/// as a list of sized renditions.
pub(crate) fn photo_url(photo: &Value) -> Option<String> {
    match photo.get("images")? {
        Value::Object(map) => {
            let preferred = ["original", "large", "medium", "small"]
                .iter()
                .find_map(|k| map.get(*k).filter(|v| !v.is_null()));
            match preferred {
                Some(Value::Object(o)) => o.get("url").and_then(Value::as_str).map(str::to_string),
                Some(Value::String(s)) => Some(s.clone()),
                _ => map
                    .values()
                    .find_map(|v| v.get("url").and_then(Value::as_str).filter(|u| !u.is_empty()))
                    .map(str::to_string),
            }
        }
        Value::Array(items) => {
            let area = |v: &Value| {
                let dim = |k: &str| v.get(k).and_then(Value::as_u64).unwrap_or(0);
                dim("width") * dim("height")
            };
            let mut sorted: Vec<&Value> = items.iter().collect();
            sorted.sort_by_key(|v| std::cmp::Reverse(area(v)));
            sorted.into_iter().find_map(|item| {
                item.get("url")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        item.get("source").and_then(|s| s.get("url")).and_then(Value::as_str)
                    })
                    .filter(|u| !u.is_empty())
                    .map(str::to_string)
            })
        }
        _ => None,
    }
}

#[async_trait]
impl ImageProvider for TripAdvisorProvider {
    fn name(&self) -> &'static str {
        "tripadvisor"
    }

    async fn search(&self, query: &str) -> Result<Vec<String>, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingKey(self.key_env.clone()))?;
        let mut ids = self.location_ids(key, query).await?;
        if ids.is_empty() || self.max_results == 0 {
            return Ok(Vec::new());
        }
        ids.truncate(ids.len().min(self.max_results).min(MAX_LOCATIONS));

        let mut photos: Vec<Value> = Vec::new();
        if ids.len() >= self.max_results {
            // more locations than wanted photos: one photo each
            for id in ids.iter().flatten() {
                if let Some(first) = self.location_photos(key, id, 1).await.into_iter().next() {
                    photos.push(first);
                }
            }
        } else {
            let counts = per_location_counts(self.max_results, ids.len());
            for (id, count) in ids.iter().zip(counts) {
                let Some(id) = id else { continue };
                if count == 0 {
                    continue;
                }
                let mut batch = self.location_photos(key, id, count).await;
                batch.truncate(count);
                photos.extend(batch);
                if photos.len() >= self.max_results {
                    break;
                }
            }
        }
        photos.truncate(self.max_results);
        Ok(photos.iter().filter_map(photo_url).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_spread_remainder_first() {
        assert_eq!(per_location_counts(18, 4), vec![5, 5, 4, 4]);
        assert_eq!(per_location_counts(18, 3), vec![6, 6, 6]);
        assert_eq!(per_location_counts(5, 7), vec![1, 1, 1, 1, 1, 0, 0]);
        assert!(per_location_counts(18, 0).is_empty());
        assert_eq!(per_location_counts(18, 4).iter().sum::<usize>(), 18);
    }

    #[test]
    fn keyed_images_prefer_original() {
        let photo = json!({"images": {
            "small": {"url": "https://ta/s.jpg"},
            "large": {"url": "https://ta/l.jpg"},
            "original": {"url": "https://ta/o.jpg", "width": 2000, "height": 1500}
        }});
        assert_eq!(photo_url(&photo).as_deref(), Some("https://ta/o.jpg"));

        let no_original = json!({"images": {"medium": {"url": "https://ta/m.jpg"}, "large": {"url": "https://ta/l.jpg"}}});
        assert_eq!(photo_url(&no_original).as_deref(), Some("https://ta/l.jpg"));
    }

    #[test]
    fn keyed_images_accept_bare_strings_and_odd_keys() {
        let bare = json!({"images": {"large": "https://ta/bare.jpg"}});
        assert_eq!(photo_url(&bare).as_deref(), Some("https://ta/bare.jpg"));

        let odd = json!({"images": {"thumbnail": {"url": "https://ta/t.jpg"}}});
        assert_eq!(photo_url(&odd).as_deref(), Some("https://ta/t.jpg"));
    }

    #[test]
    fn listed_images_pick_largest() {
        let photo = json!({"images": [
            {"url": "https://ta/small.jpg", "width": 100, "height": 100},
            {"source": {"url": "https://ta/big.jpg"}, "width": 1600, "height": 1200},
            {"url": "https://ta/mid.jpg", "width": 800, "height": 600}
        ]});
        assert_eq!(photo_url(&photo).as_deref(), Some("https://ta/big.jpg"));
    }

    #[test]
    fn photos_without_images_are_skipped() {
        assert_eq!(photo_url(&json!({"caption": "no images"})), None);
        assert_eq!(photo_url(&json!({"images": []})), None);
        assert_eq!(photo_url(&json!({"images": {}})), None);
    }

    #[test]
    fn location_ids_accept_strings_and_numbers() {
        assert_eq!(location_id(&json!({"location_id": "188151"})).as_deref(), Some("188151"));
        assert_eq!(location_id(&json!({"location_id": 42})).as_deref(), Some("42"));
        assert_eq!(location_id(&json!({"name": "x"})), None);
    }
}
