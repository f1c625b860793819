//! News search provider
//!
//! `GoogleSearchProvider` talks to the Custom Search JSON API. Queries are
//! restricted to recent results with an `after:YYYY-MM-DD` operator, and the
//! caller drops links hosted on blocked (social media) domains.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{read_secret, SearchConfig};
use crate::error::{MonitorError, MonitorResult};

/// The Custom Search API returns at most this many items per request.
const PAGE_SIZE: usize = 10;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ordered result URLs for `query`, published on or after `after`.
    async fn search(
        &self,
        query: &str,
        after: NaiveDate,
        locale: &str,
        max_results: usize,
    ) -> MonitorResult<Vec<String>>;
}

/// Earliest publication date for a search looking `days_back` days back.
///
/// Saturates at the earliest representable date.
pub fn lower_date_bound(today: NaiveDate, days_back: u32) -> NaiveDate {
    today
        .checked_sub_signed(ChronoDuration::days(i64::from(days_back)))
        .unwrap_or(NaiveDate::MIN)
}

/// Query text sent to the provider.
pub fn dated_query(query: &str, after: NaiveDate) -> String {
    format!("{} after:{}", query, after.format("%Y-%m-%d"))
}

/// Whether `link` is hosted on one of `blocked` or a subdomain of it.
pub fn is_blocked(link: &str, blocked: &[String]) -> bool {
    let host = match url::Url::parse(link) {
        Ok(parsed) => match parsed.host_str() {
            Some(host) => host.to_lowercase(),
            None => return false,
        },
        Err(_) => return false,
    };

    blocked.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_lowercase();
        !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
    })
}

/// Drop links on blocked domains, keeping order.
pub fn filter_blocked(links: Vec<String>, blocked: &[String]) -> Vec<String> {
    links
        .into_iter()
        .filter(|link| {
            let keep = !is_blocked(link, blocked);
            if !keep {
                debug!("Ignoring blocked search result: {}", link);
            }
            keep
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
}

/// Custom Search JSON API client
#[derive(Debug, Clone)]
pub struct GoogleSearchProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    engine_id: String,
}

impl GoogleSearchProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        engine_id: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for search")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            engine_id: engine_id.into(),
        })
    }

    /// Build from configuration, reading the key and engine id from the environment.
    pub fn from_config(config: &SearchConfig) -> anyhow::Result<Self> {
        let api_key = read_secret(&config.api_key_env)?;
        let engine_id = read_secret(&config.engine_id_env)?;
        Self::new(
            config.endpoint.clone(),
            api_key,
            engine_id,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn fetch_page(&self, query: &str, locale: &str, start: usize, num: usize) -> MonitorResult<Vec<String>> {
        let search_error = |reason: String| MonitorError::Search {
            query: query.to_string(),
            reason,
        };

        let start = start.to_string();
        let num = num.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("hl", locale),
                ("num", num.as_str()),
                ("start", start.as_str()),
            ])
            .send()
            .await
            .map_err(|e| search_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(search_error(format!("HTTP {}: {}", status, body.trim())));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| search_error(format!("invalid response: {}", e)))?;
        Ok(parsed.items.into_iter().map(|item| item.link).collect())
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchProvider {
    async fn search(
        &self,
        query: &str,
        after: NaiveDate,
        locale: &str,
        max_results: usize,
    ) -> MonitorResult<Vec<String>> {
        let dated = dated_query(query, after);
        let mut links = Vec::new();

        while links.len() < max_results {
            let num = (max_results - links.len()).min(PAGE_SIZE);
            let page = match self.fetch_page(&dated, locale, links.len() + 1, num).await {
                Ok(page) => page,
                Err(e) if !links.is_empty() => {
                    warn!("Search '{}' stopped after {} links: {}", dated, links.len(), e);
                    break;
                }
                Err(e) => return Err(e),
            };
            let exhausted = page.len() < num;
            links.extend(page);
            if exhausted {
                break;
            }
        }

        links.truncate(max_results);
        debug!("Search '{}' returned {} links", dated, links.len());
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_date_bound() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(lower_date_bound(today, 1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(lower_date_bound(today, 0), today);
    }

    #[test]
    fn test_lower_date_bound_saturates() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(lower_date_bound(today, u32::MAX), NaiveDate::MIN);
    }

    #[test]
    fn test_dated_query() {
        let after = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
        assert_eq!(dated_query("fintech", after), "fintech after:2024-05-07");
    }

    #[test]
    fn test_blocked_domains_and_subdomains() {
        let blocked = vec!["facebook.com".to_string(), "youtube.com".to_string()];

        assert!(is_blocked("https://facebook.com/acme", &blocked));
        assert!(is_blocked("https://m.facebook.com/acme", &blocked));
        assert!(is_blocked("https://WWW.YOUTUBE.COM/watch?v=1", &blocked));
        assert!(!is_blocked("https://notfacebook.com/a", &blocked));
        assert!(!is_blocked("https://g1.globo.com/economia/facebook.com-fraude", &blocked));
        assert!(!is_blocked("not a url", &blocked));
    }

    #[test]
    fn test_filter_blocked_keeps_order() {
        let blocked = vec!["tiktok.com".to_string()];
        let links = vec![
            "https://a.example/1".to_string(),
            "https://www.tiktok.com/@x".to_string(),
            "https://b.example/2".to_string(),
        ];
        assert_eq!(
            filter_blocked(links, &blocked),
            vec!["https://a.example/1", "https://b.example/2"]
        );
    }
}
