use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::FetcherConfig;
use crate::scheduler::{Feed, JobReceiver, Repository, WorkerPool};
use crate::telemetry::{self};
use crate::telemetry::ops::fetch::Phase as FetchPhase;
use crate::util::url;

pub mod articles;
pub mod delay;
pub mod fetch;
pub mod parse;
pub mod sanitize;

pub use fetch::{FetchError, Fetcher, HttpFetcher};
use parse::ParsedFeed;
use sanitize::Sanitizer;

/// What one pipeline run did with a feed.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub total: usize,
    pub new: usize,
    pub failed: usize,
    pub broken: usize,
    pub https_upgraded: bool,
}

/// Workers that run the ingestion pipeline.
pub struct FeedWorkerPool<R, F> {
    repository: Arc<R>,
    fetcher: F,
    cfg: FetcherConfig,
    sanitizer: Sanitizer,

    started: Mutex<HashSet<usize>>,
    in_flight: Mutex<HashSet<Uuid>>,
}

// removes the feed from `in_flight` when the pipeline run ends
struct Claim<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) { lock(self.set).remove(&self.id); }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> { m.lock().unwrap_or_else(PoisonError::into_inner) }

impl<R: Repository, F: Fetcher> FeedWorkerPool<R, F> {
    pub fn new(repository: Arc<R>, fetcher: F, cfg: FetcherConfig) -> Result<Self> {
        Ok(Self {
            repository,
            fetcher,
            cfg,
            sanitizer: Sanitizer::new()?,
            started: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    fn claim(&self, id: Uuid) -> Claim<'_> {
        let fresh = lock(&self.in_flight).insert(id);
        assert!(fresh, "feed {id} is already being fetched");
        Claim { set: &self.in_flight, id }
    }

    /// Fetch one feed and store its new articles. `feed` is updated in place with the new
    /// fetcher state, which is also written to the repository.
    pub async fn fetch_feed(&self, feed: &mut Feed) -> Result<IngestSummary> {
        let _claim = self.claim(feed.id);
        let log = telemetry::fetch();

        // updated on every attempt so a failing feed isn't immediately due again
        feed.fetcher_state.fetched_at = Utc::now();

        if !url::is_url(&feed.feed_url) {
            self.record_failure(feed, "Invalid URL".to_string()).await;
            return Err(FetchError::InvalidUrl(feed.feed_url.clone())).context("feed has invalid url");
        }

        let original_url = feed.feed_url.clone();
        let fetched = self.fetch_trying_https(feed).instrument(log.span(&FetchPhase::FetchFeed)).await;
        let mut parsed = match fetched {
            Ok(parsed) => parsed,
            Err(e) => {
                // the delay stays as is; the next attempt comes after the usual interval
                self.record_failure(feed, format!("Fetcher Error: {e}")).await;
                return Err(e).context("fetching feed");
            }
        };

        let mut summary = self.process_articles(feed, &mut parsed).await;
        summary.https_upgraded = feed.feed_url != original_url;

        self.update_feed_fields(feed, &parsed).await;
        self.repository.update_feed_info(feed.id, feed)
            .instrument(log.span(&FetchPhase::UpdateFeed))
            .await
            .context("updating feed info")?;
        Ok(summary)
    }

    async fn record_failure(&self, feed: &mut Feed, message: String) {
        let log = telemetry::fetch();
        let state = &mut feed.fetcher_state;
        state.working = false;
        state.last_error = Some(Utc::now().round_subsecs(0));
        state.message = message;

        if let Err(e) = self.repository.update_feed_info(feed.id, feed).await {
            log.error_kv("couldn't update feed info after fetch failure", [("feed", feed.id.to_string()), ("error", format!("{e:#}"))]);
        }
    }

    /// Plain HTTP feeds get one HTTPS attempt first. A non-empty HTTPS answer makes HTTPS the feed's URL.
    async fn fetch_trying_https(&self, feed: &mut Feed) -> Result<ParsedFeed, FetchError> {
        let log = telemetry::fetch();

        if url::is_http_url(&feed.feed_url) {
            let https_url = url::rewrite_to_https(&feed.feed_url);
            let probe = self.fetcher.fetch(&https_url).instrument(log.span(&FetchPhase::HttpsProbe)).await;
            match probe {
                Ok(parsed) if !parsed.items.is_empty() => {
                    log.info_kv("🔒 feed was reachable via https, updating feed url", [("feed", feed.id.to_string())]);
                    feed.feed_url = https_url;
                    return Ok(parsed);
                }
                Ok(_) => log.info_kv("feed was reachable via https but no articles found, falling back to http", [("feed", feed.id.to_string())]),
                Err(e) => log.info_kv("feed was not reachable via https", [("feed", feed.id.to_string()), ("error", e.to_string())]),
            }
        }

        self.fetcher.fetch(&feed.feed_url).await
    }

    /// Orders `parsed.items` oldest first and stores the ones not seen before.
    async fn process_articles(&self, feed: &Feed, parsed: &mut ParsedFeed) -> IngestSummary {
        let log = telemetry::fetch();
        let mut summary = IngestSummary { total: parsed.items.len(), ..Default::default() };
        if parsed.items.is_empty() {
            log.info_kv("no articles", [("feed", feed.id.to_string())]);
            return summary;
        }

        articles::order_items(&mut parsed.items);

        let ids: Vec<Option<String>> = parsed.items.iter().map(articles::natural_id).collect();
        summary.broken = ids.iter().filter(|id| id.is_none()).count();
        let lookup: Vec<String> = ids.iter().map(|id| id.clone().unwrap_or_default()).collect();

        let exists = match self.repository.check_existing_articles(feed.id, &lookup).instrument(log.span(&FetchPhase::Dedup)).await {
            Ok(exists) if exists.len() == lookup.len() => exists,
            Ok(exists) => {
                log.error_kv("existence check returned wrong number of flags", [("want", lookup.len().to_string()), ("got", exists.len().to_string())]);
                return summary;
            }
            Err(e) => {
                log.error_kv("failed checking existing articles", [("feed", feed.id.to_string()), ("error", format!("{e:#}"))]);
                return summary;
            }
        };

        let now = Utc::now().round_subsecs(0);
        let write_span = log.span(&FetchPhase::WriteArticles);
        let mut seen = HashSet::new();
        for ((item, id), exists) in parsed.items.iter().zip(ids).zip(exists) {
            let Some(site_guid) = id else { continue };
            if exists { continue; }
            // a feed repeating an id keeps only its oldest copy
            if !seen.insert(site_guid.clone()) {
                log.debug_kv("skipping repeated article id", [("feed", feed.id.to_string()), ("guid", site_guid)]);
                continue;
            }
            summary.new += 1;

            let article = articles::build_article(item, site_guid, now, &self.sanitizer);
            if let Err(e) = self.repository.add_article(feed.id, &article).instrument(write_span.clone()).await {
                summary.failed += 1;
                log.error_kv("failed adding article", [("feed", feed.id.to_string()), ("guid", article.site_guid.clone()), ("error", format!("{e:#}"))]);
                continue;
            }
            log.debug_kv("📰 got article", [("guid", article.site_guid.clone()), ("title", article.title.clone())]);
        }

        log.feed_summary(feed.id, summary.total, summary.new, summary.failed, summary.broken);
        summary
    }

    // `parsed.items` is already oldest first here
    async fn update_feed_fields(&self, feed: &mut Feed, parsed: &ParsedFeed) {
        feed.fetcher_state.working = true;
        feed.fetcher_state.last_success = Some(Utc::now().round_subsecs(0));

        if let Some(title) = &parsed.title { feed.title = Some(title.clone()); }
        if let Some(link) = &parsed.link { feed.site_url = Some(link.clone()); }
        let newest_image = parsed.items.last().and_then(|i| i.image.as_ref());
        if let Some(img) = parsed.image.as_ref().or(newest_image) {
            feed.icon = Some(img.url.clone());
        }

        self.update_fetch_delay(feed).await;
    }

    async fn update_fetch_delay(&self, feed: &mut Feed) {
        let log = telemetry::fetch();
        // article count including what we just stored
        let current = match self.repository.get_feed(feed.id).await {
            Ok(f) => f,
            Err(e) => {
                log.error_kv("failed getting feed for article count", [("feed", feed.id.to_string()), ("error", format!("{e:#}"))]);
                return;
            }
        };

        let subscribed = Utc::now() - current.created_at;
        let Some(delay_s) = delay::next_fetch_delay_s(current.article_count, subscribed, &self.cfg) else { return };
        log.info_kv("⏱️ calculated new fetch delay", [
            ("feed", feed.id.to_string()),
            ("article_count", current.article_count.to_string()),
            ("subscribed_h", subscribed.num_hours().to_string()),
            ("fetch_delay_s", delay_s.to_string()),
        ]);
        feed.fetcher_state.fetch_delay_s = delay_s;
    }
}

#[async_trait]
impl<R: Repository, F: Fetcher> WorkerPool for FeedWorkerPool<R, F> {
    async fn start_worker(&self, id: usize, jobs: JobReceiver<Feed>, done: mpsc::Sender<Feed>) {
        let fresh = lock(&self.started).insert(id);
        assert!(fresh, "worker {id} started twice");

        let log = telemetry::fetch();
        let span = log.span_kv(&FetchPhase::Worker, [("worker", id.to_string())]);
        async move {
            log.info("👷 FeedWorker running");
            while let Some(mut feed) = jobs.recv().await {
                log.info_kv("🌐 fetching feed", [("feed", feed.id.to_string()), ("url", feed.feed_url.clone())]);
                let feed_span = log.span_kv(&FetchPhase::Feed, [("feed", feed.id.to_string())]);
                let run = self.fetch_feed(&mut feed).instrument(feed_span).await;
                if let Err(e) = run {
                    log.error_kv("failed fetching feed", [("feed", feed.id.to_string()), ("error", format!("{e:#}"))]);
                }
                log.info_kv("done fetching feed", [("feed", feed.id.to_string())]);

                // report back
                if done.send(feed).await.is_err() { break; }
            }
            log.info("👷 FeedWorker stopped");
        }
        .instrument(span)
        .await
    }
}
