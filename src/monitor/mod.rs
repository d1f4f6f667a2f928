//! Monitor loop: a session object that polls pages through the relay and
//! collects keyword-matched opportunities.

pub mod export;
pub mod fetcher;
pub mod notify;
pub mod store;

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::api::models::{FetchEnvelope, FetchRequest, FetchSuccess};
use crate::error::{AppError, Result};
use crate::scan::{self, Link};

use self::fetcher::Fetcher;
use self::notify::Notify;
use self::store::{PersistedState, StateStore};

/// Most-recent results kept in the persisted list.
pub const RESULT_CAP: usize = 100;
/// Candidate cap for one-shot connection tests.
const TEST_SCAN_CAP: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: String,
    pub name: String,
    pub url: String,
    pub added_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Test,
    Monitor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source: String,
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ResultKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub last_check: Option<DateTime<Utc>>,
}

/// Where a session currently is in its check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Testing,
    Checking,
}

#[derive(Debug)]
struct SessionState {
    websites: Vec<Website>,
    results: Vec<ResultItem>,
    stats: Stats,
    phase: Phase,
    monitoring: bool,
    // Bumped on every start/stop; checks carrying an older value discard
    // their results on arrival.
    generation: u64,
    next_id: u64,
}

impl SessionState {
    fn make_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), self.next_id)
    }
}

struct ActiveRun {
    cancel: CancellationToken,
}

/// All monitoring state behind one handle. The relay, the store, and the
/// notification sink are injected so the session can run against anything.
pub struct MonitorSession {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notify>,
    state: Arc<RwLock<SessionState>>,
    run: Mutex<Option<ActiveRun>>,
}

impl MonitorSession {
    /// Build a session, restoring whatever the store holds. Unreadable state
    /// is logged and treated as empty.
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn StateStore>, notifier: Arc<dyn Notify>) -> Self {
        let persisted = match store.load() {
            Ok(Some(persisted)) => persisted,
            Ok(None) => PersistedState::default(),
            Err(err) => {
                tracing::warn!("Failed to load persisted state, starting empty: {}", err);
                PersistedState::default()
            }
        };

        let state = SessionState {
            websites: persisted.websites,
            results: persisted.results,
            stats: persisted.stats,
            phase: Phase::Idle,
            monitoring: false,
            generation: 0,
            next_id: 0,
        };

        MonitorSession {
            fetcher,
            store,
            notifier,
            state: Arc::new(RwLock::new(state)),
            run: Mutex::new(None),
        }
    }

    pub async fn websites(&self) -> Vec<Website> {
        self.state.read().await.websites.clone()
    }

    pub async fn results(&self) -> Vec<ResultItem> {
        self.state.read().await.results.clone()
    }

    pub async fn stats(&self) -> Stats {
        self.state.read().await.stats.clone()
    }

    pub async fn is_monitoring(&self) -> bool {
        self.state.read().await.monitoring
    }

    pub async fn phase(&self) -> Phase {
        self.state.read().await.phase
    }

    /// Register a URL for monitoring. Returns false when it was already
    /// present.
    pub async fn add_website(&self, url: &str) -> Result<bool> {
        validate_url(url)?;

        let mut state = self.state.write().await;
        if state.websites.iter().any(|w| w.url == url) {
            return Ok(false);
        }

        let website = Website {
            id: state.make_id("website"),
            name: scan::hostname(url),
            url: url.to_string(),
            added_at: Utc::now(),
            last_checked_at: None,
        };
        state.websites.insert(0, website);
        persist(self.store.as_ref(), &state);
        Ok(true)
    }

    /// Remove a website by id. Returns false when no such id exists.
    pub async fn remove_website(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.websites.len();
        state.websites.retain(|w| w.id != id);
        let removed = state.websites.len() != before;
        if removed {
            persist(self.store.as_ref(), &state);
        }
        removed
    }

    /// Begin watching a URL. Registers it, performs one immediate check, and
    /// arms a repeating timer when the interval is non-zero. A previous run
    /// is replaced.
    pub async fn start_monitoring(&self, url: &str, interval: Duration, keywords: Vec<String>) -> Result<()> {
        validate_url(url)?;
        self.add_website(url).await?;

        let generation = {
            let mut state = self.state.write().await;
            state.monitoring = true;
            state.generation += 1;
            state.generation
        };

        let cancel = CancellationToken::new();
        {
            let mut run = self.run.lock().expect("run lock poisoned");
            if let Some(previous) = run.take() {
                previous.cancel.cancel();
            }
            *run = Some(ActiveRun {
                cancel: cancel.clone(),
            });
        }
        self.notifier.monitoring_changed(true);

        let ctx = CheckContext {
            fetcher: Arc::clone(&self.fetcher),
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            state: Arc::clone(&self.state),
            url: url.to_string(),
            keywords,
        };

        if interval.is_zero() {
            tokio::spawn(run_check(ctx, generation));
            return Ok(());
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Monitoring loop for {} cancelled", ctx.url);
                        break;
                    }
                    _ = ticker.tick() => {
                        // Checks run as their own tasks; a slow response
                        // never delays the next tick.
                        tokio::spawn(run_check(ctx.clone(), generation));
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the repeating timer. Safe to call when not monitoring.
    pub async fn stop_monitoring(&self) {
        let was_active = {
            let mut run = self.run.lock().expect("run lock poisoned");
            match run.take() {
                Some(active) => {
                    active.cancel.cancel();
                    true
                }
                None => false,
            }
        };

        {
            let mut state = self.state.write().await;
            state.monitoring = false;
            state.phase = Phase::Idle;
            state.generation += 1;
        }

        if was_active {
            self.notifier.monitoring_changed(false);
        }
    }

    /// Run a single monitoring pass against a URL right now.
    pub async fn check_for_updates(&self, url: &str, keywords: &[String]) {
        let generation = self.state.read().await.generation;
        let ctx = CheckContext {
            fetcher: Arc::clone(&self.fetcher),
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            state: Arc::clone(&self.state),
            url: url.to_string(),
            keywords: keywords.to_vec(),
        };
        run_check(ctx, generation).await;
    }

    /// One-shot probe of a URL. Returns matched candidates for display
    /// without storing them; errors are surfaced to the caller.
    pub async fn test_connection(&self, url: &str) -> Result<Vec<ResultItem>> {
        validate_url(url)?;

        {
            let mut state = self.state.write().await;
            state.phase = Phase::Testing;
            state.stats.total_requests += 1;
        }

        let request = FetchRequest::get(url);
        let outcome = self.fetcher.fetch(&request).await;

        let mut state = self.state.write().await;
        state.phase = Phase::Idle;

        match outcome {
            Ok(FetchEnvelope::Success(success)) => {
                state.stats.successful_requests += 1;
                state.stats.last_check = Some(Utc::now());
                let items = test_items(url, &success, &mut state);
                persist(self.store.as_ref(), &state);
                Ok(items)
            }
            Ok(FetchEnvelope::Failure(failure)) => {
                state.stats.failed_requests += 1;
                persist(self.store.as_ref(), &state);
                Err(AppError::FetchError(format!("Connection failed: {}", failure.error)))
            }
            Err(err) => {
                state.stats.failed_requests += 1;
                persist(self.store.as_ref(), &state);
                Err(err)
            }
        }
    }

    /// Drop all stored results.
    pub async fn clear_results(&self) {
        let mut state = self.state.write().await;
        state.results.clear();
        persist(self.store.as_ref(), &state);
    }

    /// Render stored results as CSV; None when there is nothing to export.
    pub async fn export_csv(&self) -> Option<String> {
        let state = self.state.read().await;
        export::to_csv(&state.results)
    }

    /// Write the CSV export to `path`. Returns false, writing nothing, when
    /// the result list is empty.
    pub async fn export_to(&self, path: &Path) -> Result<bool> {
        match self.export_csv().await {
            Some(csv) => {
                std::fs::write(path, csv)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Plain-text rendering of stored results for clipboard use.
    pub async fn plain_text(&self) -> String {
        let state = self.state.read().await;
        export::to_plain_text(&state.results)
    }
}

#[derive(Clone)]
struct CheckContext {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notify>,
    state: Arc<RwLock<SessionState>>,
    url: String,
    keywords: Vec<String>,
}

async fn run_check(ctx: CheckContext, generation: u64) {
    {
        let mut state = ctx.state.write().await;
        state.phase = Phase::Checking;
        state.stats.total_requests += 1;
    }

    let request = FetchRequest::get(ctx.url.clone());
    let outcome = ctx.fetcher.fetch(&request).await;

    let mut state = ctx.state.write().await;
    state.phase = Phase::Idle;

    match outcome {
        Ok(FetchEnvelope::Success(success)) => {
            state.stats.successful_requests += 1;
            state.stats.last_check = Some(Utc::now());

            if state.generation != generation {
                tracing::debug!("Discarding stale check result for {}", ctx.url);
                persist(ctx.store.as_ref(), &state);
                return;
            }

            if success.content_type.contains("text/html") {
                let candidates = scan_candidates(&ctx.url, &success, &ctx.keywords);
                apply_candidates(&mut state, &ctx, candidates);
            }

            if let Some(website) = state.websites.iter_mut().find(|w| w.url == ctx.url) {
                website.last_checked_at = Some(Utc::now());
            }
            persist(ctx.store.as_ref(), &state);
        }
        Ok(FetchEnvelope::Failure(failure)) => {
            state.stats.failed_requests += 1;
            persist(ctx.store.as_ref(), &state);
            drop(state);
            tracing::warn!("Check failed for {}: {} ({})", ctx.url, failure.error, failure.code);
            ctx.notifier.check_failed(&ctx.url, &failure.error);
        }
        Err(err) => {
            state.stats.failed_requests += 1;
            persist(ctx.store.as_ref(), &state);
            drop(state);
            tracing::warn!("Relay unreachable for {}: {}", ctx.url, err);
            ctx.notifier.check_failed(&ctx.url, &err.to_string());
        }
    }
}

struct Candidate {
    title: String,
    url: String,
    description: String,
}

fn scan_candidates(page_url: &str, page: &FetchSuccess, keywords: &[String]) -> Vec<Candidate> {
    let parsed = scan::parse_page(&page.content);
    if !scan::keyword_gate(&parsed.text, keywords) {
        return Vec::new();
    }

    let host = scan::hostname(page_url);
    let mut candidates: Vec<Candidate> = scan::match_links(&parsed.links, scan::BID_TERMS)
        .into_iter()
        .map(|link| Candidate {
            title: link_title(link),
            url: scan::resolve_href(page_url, &link.href),
            description: format!("Found during monitoring of {}", host),
        })
        .collect();

    // A keyword hit with no matching anchors still surfaces the page itself.
    if candidates.is_empty() {
        candidates.push(Candidate {
            title: parsed.title.unwrap_or_else(|| "Updated Content".to_string()),
            url: page_url.to_string(),
            description: "Page content updated with matching keywords".to_string(),
        });
    }

    candidates
}

fn apply_candidates(state: &mut SessionState, ctx: &CheckContext, candidates: Vec<Candidate>) {
    let source = scan::hostname(&ctx.url);

    for candidate in candidates {
        let duplicate = state
            .results
            .iter()
            .any(|r| r.title == candidate.title && r.url == candidate.url);
        if duplicate {
            continue;
        }

        let item = ResultItem {
            id: state.make_id("monitor"),
            title: candidate.title,
            url: candidate.url,
            source: source.clone(),
            description: candidate.description,
            date: Utc::now(),
            kind: ResultKind::Monitor,
        };
        ctx.notifier.item_found(&item);
        state.results.insert(0, item);
    }

    state.results.truncate(RESULT_CAP);
}

fn test_items(url: &str, page: &FetchSuccess, state: &mut SessionState) -> Vec<ResultItem> {
    let source = scan::hostname(url);
    let parsed = scan::parse_page(&page.content);

    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for link in scan::match_links(&parsed.links, scan::TEST_TERMS) {
        let resolved = scan::resolve_href(url, &link.href);
        if !seen.insert(resolved.clone()) {
            continue;
        }

        items.push(ResultItem {
            id: state.make_id("test"),
            title: link_title(link),
            url: resolved,
            source: source.clone(),
            description: "Found during test scan".to_string(),
            date: Utc::now(),
            kind: ResultKind::Test,
        });
        if items.len() == TEST_SCAN_CAP {
            break;
        }
    }
    items
}

fn link_title(link: &Link) -> String {
    if link.text.is_empty() {
        "Bidding Opportunity".to_string()
    } else {
        link.text.clone()
    }
}

fn persist(store: &dyn StateStore, state: &SessionState) {
    let record = PersistedState {
        version: store::STATE_VERSION,
        websites: state.websites.clone(),
        results: state.results.clone(),
        stats: state.stats.clone(),
    };
    if let Err(err) = store.save(&record) {
        tracing::warn!("Failed to persist state: {}", err);
    }
}

fn validate_url(url: &str) -> Result<()> {
    if !url.starts_with("http") {
        return Err(AppError::ValidationError(
            "Valid URL is required (must start with http:// or https://)".to_string(),
        ));
    }
    Ok(())
}
