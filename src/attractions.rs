use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, future::Future, pin::Pin};
use tracing::warn;

use crate::config::AttractionsCfg;
use crate::providers::key_from_env;

/// Turns a place name into an ordered list of attraction names.
pub trait AttractionGenerator: Send + Sync {
    fn attractions<'a>(
        &'a self,
        place: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;
    fn name(&self) -> &'static str;
}

pub struct OpenAIAttractions {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_items: usize,
    max_tokens: u32,
    base_url: String,
}

impl OpenAIAttractions {
    pub fn new(api_key: String, model: String, max_items: usize, max_tokens: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            max_items,
            max_tokens,
            base_url: "https://api.openai.com".into(),
        }
    }

    /// `None` when disabled or when the key variable is unset.
    pub fn from_cfg(cfg: &AttractionsCfg) -> Option<Self> {
        if !cfg.enabled {
            return None;
        }
        let Some(key) = key_from_env(&cfg.api_key_env) else {
            warn!(var = %cfg.api_key_env, "attraction generator enabled but no API key set");
            return None;
        };
        let mut gen = Self::new(key, cfg.model.clone(), cfg.max_items, cfg.max_tokens);
        gen.base_url = cfg.base_url.trim_end_matches('/').to_string();
        Some(gen)
    }

    fn prompt(&self, place: &str) -> String {
        format!(
            "List up to {n} of the most visited tourist attractions in {place}. \
             Reply with one attraction name per line and nothing else.",
            n = self.max_items
        )
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatTurn<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatTurn<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

impl AttractionGenerator for OpenAIAttractions {
    fn attractions<'a>(
        &'a self,
        place: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            let prompt = self.prompt(place);
            let req = CompletionRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                messages: [
                    ChatTurn { role: "system", content: "You are a concise travel guide." },
                    ChatTurn { role: "user", content: &prompt },
                ],
            };
            let resp = self
                .client
                .post(format!("{}/v1/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await?
                .error_for_status()?
                .json::<CompletionResponse>()
                .await?;
            let text = resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            Ok(parse_attraction_list(&text, self.max_items))
        })
    }

    fn name(&self) -> &'static str {
        "openai-attractions"
    }
}

fn is_list_item(line: &str) -> bool {
    let line = line.trim_start();
    if line.starts_with(['-', '*', '•', '·']) {
        return true;
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(line[digits..].chars().next(), Some('.') | Some(')'))
}

fn clean_item(raw: &str) -> Option<String> {
    let mut s = raw.trim().trim_start_matches(['-', '*', '•', '·']).trim_start();
    let digits = s.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &s[digits..];
        if let Some(r) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            s = r.trim_start();
        }
    }
    let unmarked = s.replace("**", "").replace("__", "");
    let mut name = unmarked.as_str();
    for sep in [" - ", " – ", " — ", ": "] {
        if let Some(idx) = name.find(sep) {
            name = &name[..idx];
        }
    }
    let name = name.trim().trim_matches(['"', '\'', '“', '”', '*', '`']).trim();
    if name.is_empty() || name.chars().count() > 80 {
        return None;
    }
    Some(name.to_string())
}

/// Best-effort extraction of attraction names from free text.
///
/// Understands numbered and bulleted lists (keeping only list lines when any
/// exist), plain one-per-line answers and a single comma-separated line.
/// Anything unusable yields an empty list.
pub fn parse_attraction_list(text: &str, max: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let items: Vec<&str> = if lines.len() == 1 && lines[0].contains(',') {
        lines[0].split(',').collect()
    } else if lines.iter().any(|l| is_list_item(l)) {
        lines.into_iter().filter(|l| is_list_item(l)).collect()
    } else {
        lines
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if out.len() >= max {
            break;
        }
        if item.trim_end().ends_with(':') {
            continue;
        }
        if let Some(name) = clean_item(item) {
            if seen.insert(name.to_lowercase()) {
                out.push(name);
            }
        }
    }
    out
}
