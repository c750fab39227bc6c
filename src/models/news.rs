use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unique external news article. `url` is the identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// The headline.
    pub title: String,
    /// Summary text.
    pub description: String,
    /// Canonical URL.
    pub url: String,
    /// Publication timestamp.
    pub published_at: DateTime<Utc>,
    /// Source label, e.g. the publisher's name.
    pub source: String,
    /// Lead image, when the source provides one.
    pub image: Option<String>,
}

/// Response body of the news endpoint.
#[derive(Debug, Serialize)]
pub struct NewsFeed {
    pub articles: Vec<Article>,
    pub count: usize,
}

impl From<Vec<Article>> for NewsFeed {
    fn from(articles: Vec<Article>) -> Self {
        Self {
            count: articles.len(),
            articles,
        }
    }
}
