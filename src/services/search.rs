use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::{
    config::NewsConfig,
    error::{AppError, Result},
    models::news::Article,
};

/// A single-keyword news search.
#[async_trait]
pub trait NewsSearch: Send + Sync {
    /// Returns the newest articles matching `keyword`.
    async fn search(&self, keyword: &str) -> Result<Vec<Article>>;
}

/// Client for a GNews-compatible search API.
#[derive(Clone)]
pub struct GNewsClient {
    client: Client,
    base_url: String,
    api_key: Zeroizing<String>,
    language: String,
    page_size: u32,
}

impl GNewsClient {
    /// Creates a new `GNewsClient` from the news configuration.
    pub fn new(config: &NewsConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            language: config.language.clone(),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl NewsSearch for GNewsClient {
    async fn search(&self, keyword: &str) -> Result<Vec<Article>> {
        let page_size = self.page_size.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", keyword),
                ("lang", self.language.as_str()),
                ("sortby", "publishedAt"),
                ("max", page_size.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(AppError::SearchApi {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let articles = parse_search_response(&bytes)?;
        tracing::debug!("📰 '{}' returned {} articles", keyword, articles.len());
        Ok(articles)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    articles: Vec<RawArticle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    source: Option<RawSource>,
}

#[derive(Deserialize)]
struct RawSource {
    #[serde(default)]
    name: String,
}

/// Decodes a search API body.
///
/// Entries without a URL or without a readable RFC 3339 `publishedAt` are
/// dropped; the rest of the page is kept.
pub fn parse_search_response(body: &[u8]) -> Result<Vec<Article>> {
    let response: SearchResponse = sonic_rs::from_slice(body)
        .map_err(|e| AppError::Internal(format!("Invalid search response: {}", e)))?;

    Ok(response
        .articles
        .into_iter()
        .filter(|raw| !raw.url.trim().is_empty())
        .filter_map(|raw| {
            let Some(published_at) = raw.published_at.as_deref().and_then(parse_timestamp) else {
                tracing::debug!("Skipping article without a usable date: {}", raw.url);
                return None;
            };
            Some(Article {
                title: raw.title,
                description: raw.description.unwrap_or_default(),
                url: raw.url,
                published_at,
                source: raw.source.map(|s| s.name).unwrap_or_default(),
                image: raw.image.filter(|i| !i.is_empty()),
            })
        })
        .collect())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gnews_payload() {
        let body = br#"{
            "totalArticles": 2,
            "articles": [
                {
                    "title": "ACME beats estimates",
                    "description": "Quarterly results",
                    "content": "...",
                    "url": "https://news.example/acme",
                    "image": "https://img.example/acme.png",
                    "publishedAt": "2026-02-10T08:15:00Z",
                    "source": { "name": "Example Wire", "url": "https://news.example" }
                },
                {
                    "title": "No link",
                    "url": "",
                    "publishedAt": "2026-02-10T07:00:00Z"
                }
            ]
        }"#;

        let articles = parse_search_response(body).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://news.example/acme");
        assert_eq!(articles[0].source, "Example Wire");
        assert_eq!(articles[0].image.as_deref(), Some("https://img.example/acme.png"));
        assert_eq!(articles[0].published_at.to_rfc3339(), "2026-02-10T08:15:00+00:00");
    }

    #[test]
    fn undated_entries_are_dropped_without_losing_the_page() {
        let body = br#"{
            "totalArticles": 4,
            "articles": [
                {
                    "title": "SG opens new desk",
                    "url": "https://news.example/sg",
                    "publishedAt": "2026-03-01T09:30:00+01:00"
                },
                { "title": "Null date", "url": "https://news.example/null", "publishedAt": null },
                { "title": "Bad date", "url": "https://news.example/bad", "publishedAt": "yesterday" },
                { "title": "No date", "url": "https://news.example/none" }
            ]
        }"#;

        let articles = parse_search_response(body).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://news.example/sg");
        assert_eq!(articles[0].published_at.to_rfc3339(), "2026-03-01T08:30:00+00:00");
    }

    #[test]
    fn missing_articles_field_is_empty() {
        assert!(parse_search_response(br#"{"totalArticles":0}"#).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_search_response(b"<html>").is_err());
    }
}
