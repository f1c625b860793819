//! End-to-end monitoring run
//!
//! For every keyword: search (paced), post the links found, then extract,
//! filter, look up and score the entities of each page. Once every page is
//! done the results are aggregated and surfaced matches are alerted.
//!
//! Every collaborator failure is recovered locally and counted in the
//! [`RunStats`]; nothing here aborts a run once it has started.

use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::aggregate::{aggregate, surfaced};
use crate::alerts::{
    match_alert, news_header, news_item, open_alert_sink, AlertSink, ALERT_HEADER, NO_MATCHES_MESSAGE,
};
use crate::config::AppConfig;
use crate::content::ContentExtractor;
use crate::entity_filter::{Denylists, EntityFilter};
use crate::extractor::{ChatCompletionExtractor, EntityExtractor};
use crate::logger::RunLogger;
use crate::matcher::FuzzyMatcher;
use crate::model::{AlertTier, MatchResult};
use crate::rate_limit::PacingContext;
use crate::registry::{open_registry, MerchantRegistry};
use crate::search::{filter_blocked, lower_date_bound, GoogleSearchProvider, SearchProvider};

/// Per-run settings taken from configuration and the command line
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub days_back: u32,
    pub max_results: usize,
    pub locale: String,
    pub blocked_domains: Vec<String>,
    pub page_concurrency: usize,
}

impl RunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            days_back: config.search.days_back,
            max_results: config.search.max_results,
            locale: config.search.locale.clone(),
            blocked_domains: config.search.blocked_domains.clone(),
            page_concurrency: config.pipeline.page_concurrency.max(1),
        }
    }
}

/// Everything a run needs, built once at startup
pub struct MonitorContext {
    pub search: Arc<dyn SearchProvider>,
    pub content: ContentExtractor,
    pub extractor: Arc<dyn EntityExtractor>,
    pub filter: EntityFilter,
    pub registry: Arc<dyn MerchantRegistry>,
    pub alerts: Arc<dyn AlertSink>,
    pub matcher: FuzzyMatcher,
    pub pacing: PacingContext,
    pub options: RunOptions,
}

impl MonitorContext {
    /// Build every collaborator from configuration.
    ///
    /// Credentials are acquired here; a missing or rejected credential is a
    /// [`MonitorError::Authentication`](crate::error::MonitorError) inside the returned error.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let pacing = PacingContext::from_config(config);
        pacing.log_config(config);

        let content = ContentExtractor::new(&config.http)?.with_pacer(pacing.fetch.clone());
        let search = Arc::new(GoogleSearchProvider::from_config(&config.search)?);
        let extractor = Arc::new(ChatCompletionExtractor::from_config(&config.extractor)?);
        let filter = EntityFilter::new(Denylists::from_config(&config.filter)?);
        let registry = open_registry(&config.registry).await?;
        let alerts = open_alert_sink(&config.alerts)?;

        Ok(Self {
            search,
            content,
            extractor,
            filter,
            registry,
            alerts,
            matcher: FuzzyMatcher::new(),
            pacing,
            options: RunOptions::from_config(config),
        })
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub keywords: usize,
    pub searches_failed: usize,
    pub links: usize,
    pub empty_pages: usize,
    pub extraction_failures: usize,
    pub entities_extracted: usize,
    pub entities_kept: usize,
    pub entities_dropped: usize,
    pub registry_failures: usize,
    pub candidates_scored: usize,
    pub alerts_sent: usize,
    pub alerts_failed: usize,
}

impl RunStats {
    fn absorb(&mut self, page: &PageOutcome) {
        if page.empty {
            self.empty_pages += 1;
        }
        if page.extraction_failed {
            self.extraction_failures += 1;
        }
        self.entities_extracted += page.entities_extracted;
        self.entities_kept += page.entities_kept;
        self.entities_dropped += page.entities_extracted - page.entities_kept;
        self.registry_failures += page.registry_failures;
        self.candidates_scored += page.results.len();
    }
}

/// Outcome of a run: aggregated matches, best first
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub ranked: Vec<MatchResult>,
    pub stats: RunStats,
}

impl RunReport {
    pub fn surfaced(&self) -> Vec<(&MatchResult, AlertTier)> {
        surfaced(&self.ranked)
    }
}

#[derive(Debug, Default)]
struct PageOutcome {
    empty: bool,
    extraction_failed: bool,
    entities_extracted: usize,
    entities_kept: usize,
    registry_failures: usize,
    results: Vec<MatchResult>,
}

pub struct Monitor {
    context: MonitorContext,
    logger: RunLogger,
}

impl Monitor {
    pub fn new(context: MonitorContext, logger: RunLogger) -> Self {
        Self { context, logger }
    }

    /// Run with the search window ending today.
    pub async fn run(&self, keywords: &[String]) -> RunReport {
        self.run_for_date(keywords, Local::now().date_naive()).await
    }

    pub async fn run_for_date(&self, keywords: &[String], today: NaiveDate) -> RunReport {
        let options = &self.context.options;
        let after = lower_date_bound(today, options.days_back);
        let mut stats = RunStats {
            keywords: keywords.len(),
            ..RunStats::default()
        };

        self.logger.log_run_start(keywords, options.days_back);

        let mut batches = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let links = self.search_keyword(keyword, after, &mut stats).await;
            stats.links += links.len();
            batches.push((keyword, links));
        }

        self.logger.start_progress(stats.links as u64).await;

        let mut all_results = Vec::new();
        for (keyword, links) in &batches {
            if links.is_empty() {
                continue;
            }

            self.logger.update_progress(&format!("'{}'", keyword)).await;
            let thread = self
                .post(&news_header(keyword, options.days_back), None, &mut stats)
                .await;
            for (i, link) in links.iter().enumerate() {
                self.post(&news_item(i + 1, link), thread.as_deref(), &mut stats)
                    .await;
            }

            // Ordered: results arrive in link order whatever the concurrency
            let outcomes: Vec<PageOutcome> = stream::iter(links.iter())
                .map(|link| self.process_page(link))
                .buffered(options.page_concurrency)
                .collect()
                .await;

            for mut outcome in outcomes {
                stats.absorb(&outcome);
                all_results.append(&mut outcome.results);
            }
        }

        self.logger.finish_progress("All pages processed").await;

        let ranked = aggregate(all_results);
        info!("Aggregated {} unique merchant matches", ranked.len());
        self.send_alerts(&ranked, &mut stats).await;

        RunReport { ranked, stats }
    }

    async fn search_keyword(&self, keyword: &str, after: NaiveDate, stats: &mut RunStats) -> Vec<String> {
        let options = &self.context.options;
        self.context.pacing.search.acquire().await;

        match self
            .context
            .search
            .search(keyword, after, &options.locale, options.max_results)
            .await
        {
            Ok(found) => {
                let total = found.len();
                let links = filter_blocked(found, &options.blocked_domains);
                self.logger.log_search_result(keyword, links.len(), total - links.len());
                links
            }
            Err(e) => {
                stats.searches_failed += 1;
                self.logger.log_search_failed(keyword, &e.to_string());
                Vec::new()
            }
        }
    }

    async fn process_page(&self, url: &str) -> PageOutcome {
        let mut outcome = PageOutcome::default();
        let page = self.context.content.extract(url).await;
        outcome.empty = page.is_empty();

        let entities = match self.context.extractor.extract(&page.combined_text()).await {
            Ok(entities) => entities,
            Err(e) => {
                outcome.extraction_failed = true;
                self.logger.log_extraction_failed(url, &e.to_string());
                Vec::new()
            }
        };
        outcome.entities_extracted = entities.len();

        let kept = self.context.filter.filter(entities);
        outcome.entities_kept = kept.len();
        debug!("{}: {} of {} entities kept", url, kept.len(), outcome.entities_extracted);

        for entity in &kept {
            match self.context.registry.find_matches(&entity.text).await {
                Ok(candidates) => {
                    self.logger.log_entity_candidates(&entity.text, candidates.len());
                    outcome
                        .results
                        .extend(self.context.matcher.score_candidates(entity, &candidates));
                }
                Err(e) => {
                    outcome.registry_failures += 1;
                    self.logger.log_registry_failed(&entity.text, &e.to_string());
                }
            }
        }

        self.logger.log_page_processed(
            url,
            page.body.chars().count(),
            outcome.entities_kept,
            outcome.entities_extracted - outcome.entities_kept,
        );
        self.logger.advance_progress(1).await;
        outcome
    }

    async fn send_alerts(&self, ranked: &[MatchResult], stats: &mut RunStats) {
        if ranked.is_empty() {
            self.post(NO_MATCHES_MESSAGE, None, stats).await;
            return;
        }

        let thread = self.post(ALERT_HEADER, None, stats).await;
        for (result, tier) in surfaced(ranked) {
            self.post(&match_alert(result, tier), thread.as_deref(), stats)
                .await;
        }
    }

    /// Post one message; failures are counted and logged, never propagated.
    async fn post(&self, text: &str, thread: Option<&str>, stats: &mut RunStats) -> Option<String> {
        match self.context.alerts.post(text, thread).await {
            Ok(id) => {
                stats.alerts_sent += 1;
                Some(id)
            }
            Err(e) => {
                stats.alerts_failed += 1;
                self.logger.log_alert_failed(&e.to_string());
                None
            }
        }
    }
}
