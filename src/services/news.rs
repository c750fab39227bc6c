use std::collections::{BTreeMap, BTreeSet};

use futures::future::join_all;
use uuid::Uuid;

use crate::{
    models::news::Article,
    repositories::keywords::KeywordSource,
    services::search::NewsSearch,
    state::SearchLimiter,
};

/// Builds a user's news feed from their related business records.
pub struct NewsAggregator<K, S> {
    keywords: K,
    search: S,
    limiter: SearchLimiter,
    trade_limit: i64,
}

impl<K, S> NewsAggregator<K, S>
where
    K: KeywordSource,
    S: NewsSearch,
{
    /// Creates a new `NewsAggregator`.
    ///
    /// # Arguments
    ///
    /// * `keywords` - Where the keyword set comes from.
    /// * `search` - The external search API.
    /// * `limiter` - Shared bound on in-flight searches.
    /// * `trade_limit` - How many recent trades contribute instruments.
    pub fn new(keywords: K, search: S, limiter: SearchLimiter, trade_limit: i64) -> Self {
        Self {
            keywords,
            search,
            limiter,
            trade_limit,
        }
    }

    /// Returns the deduplicated, newest-first feed for `user_id`.
    ///
    /// Never fails: an unreadable keyword source or failing searches only
    /// shrink the result.
    pub async fn aggregate(&self, user_id: Uuid) -> Vec<Article> {
        let keywords = self.collect_keywords(user_id).await;
        let articles = self.aggregate_keywords(&keywords).await;
        tracing::info!(
            "📰 News for user {}: {} keywords, {} articles",
            user_id,
            keywords.len(),
            articles.len()
        );
        articles
    }

    /// Reads the keyword set, degrading to an empty set on failure.
    pub async fn collect_keywords(&self, user_id: Uuid) -> BTreeSet<String> {
        match self.keywords.collect(user_id, self.trade_limit).await {
            Ok(keywords) => keywords,
            Err(e) => {
                tracing::warn!("⚠️  Could not collect keywords for user {}: {}", user_id, e);
                BTreeSet::new()
            }
        }
    }

    /// Queries every keyword and merges the outcomes once all have settled.
    pub async fn aggregate_keywords(&self, keywords: &BTreeSet<String>) -> Vec<Article> {
        if keywords.is_empty() {
            return Vec::new();
        }

        let outcomes = join_all(keywords.iter().map(|keyword| self.search_keyword(keyword))).await;
        merge_articles(outcomes)
    }

    async fn search_keyword(&self, keyword: &str) -> Vec<Article> {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!("⚠️  Skipping keyword '{}': {}", keyword, e);
                return Vec::new();
            }
        };

        match self.search.search(keyword).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!("⚠️  News search failed for '{}': {}", keyword, e);
                Vec::new()
            }
        }
    }
}

/// Collapses articles by URL and sorts them newest first.
///
/// Batches are applied in order and the last article seen for a URL wins.
/// Articles published at the same instant are ordered by URL.
pub fn merge_articles<I>(batches: I) -> Vec<Article>
where
    I: IntoIterator<Item = Vec<Article>>,
{
    let mut by_url: BTreeMap<String, Article> = BTreeMap::new();
    for article in batches.into_iter().flatten() {
        by_url.insert(article.url.clone(), article);
    }

    let mut merged: Vec<Article> = by_url.into_values().collect();
    merged.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    merged
}
