//! Daily quota for external task submissions.
//!
//! The backend keeps one counter document per UTC day,
//! `{collection}/global_YYYY-MM-DD`, whose `count` (or legacy
//! `currentCount`) field holds the number of submissions accepted that day.
//! This module only reads the counter; incrementing it is the backend's job.
//!
//! Reads are cached for [`LIMIT_CACHE_TTL`]. When the store cannot be
//! reached the quota is reported as untouched rather than blocking
//! submissions.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::infrastructure::{CollectionName, Document, DocumentId, DocumentStore};

/// Submissions allowed per day unless configured otherwise.
pub const DEFAULT_DAILY_LIMIT: u32 = 10;

/// How long a fetched counter is reused before the store is asked again.
pub const LIMIT_CACHE_TTL: Duration = Duration::from_secs(30);

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Id of the counter document for `date`.
#[must_use]
pub fn counter_document_id(date: NaiveDate) -> DocumentId {
    DocumentId::new(format!("global_{}", date.format(DATE_FORMAT)))
}

// =============================================================================
// Limit Info
// =============================================================================

/// Quota state for one day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyLimitInfo {
    /// Submissions accepted so far.
    pub current_count: u32,
    /// Submissions allowed.
    pub max_limit: u32,
    /// Submissions still available, never negative.
    pub remaining: u32,
    /// The UTC day the counter belongs to.
    pub date: NaiveDate,
    /// `true` once `current_count` reaches `max_limit`.
    pub is_limit_reached: bool,
}

impl DailyLimitInfo {
    /// Builds the quota state for `current_count` submissions.
    #[must_use]
    pub const fn new(current_count: u32, max_limit: u32, date: NaiveDate) -> Self {
        Self {
            current_count,
            max_limit,
            remaining: max_limit.saturating_sub(current_count),
            date,
            is_limit_reached: current_count >= max_limit,
        }
    }

    /// An untouched quota.
    #[must_use]
    pub const fn fresh(max_limit: u32, date: NaiveDate) -> Self {
        Self::new(0, max_limit, date)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_field(document: &Document) -> u32 {
    ["count", "currentCount"]
        .iter()
        .filter_map(|key| document.get(*key).and_then(Value::as_f64))
        .find(|count| *count > 0.0)
        .map_or(0, |count| count.min(f64::from(u32::MAX)) as u32)
}

// =============================================================================
// Daily Limit
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Fetched {
    at: Instant,
    date: NaiveDate,
}

/// Cached reader of the daily submission counter.
///
/// Cloning is cheap; clones share the cache.
#[derive(Clone)]
pub struct DailyLimit {
    store: Arc<dyn DocumentStore>,
    collection: CollectionName,
    max_limit: u32,
    cache_ttl: Duration,
    info: Arc<watch::Sender<DailyLimitInfo>>,
    fetched: Arc<Mutex<Option<Fetched>>>,
}

impl std::fmt::Debug for DailyLimit {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DailyLimit")
            .field("collection", &self.collection)
            .field("max_limit", &self.max_limit)
            .field("info", &*self.info.borrow())
            .finish_non_exhaustive()
    }
}

impl DailyLimit {
    /// Creates a reader over `collection` allowing `max_limit` submissions
    /// per day.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collection: CollectionName, max_limit: u32) -> Self {
        let (info, _receiver) =
            watch::channel(DailyLimitInfo::fresh(max_limit, Utc::now().date_naive()));
        Self {
            store,
            collection,
            max_limit,
            cache_ttl: LIMIT_CACHE_TTL,
            info: Arc::new(info),
            fetched: Arc::new(Mutex::new(None)),
        }
    }

    /// Replaces the cache lifetime.
    #[must_use]
    pub const fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Returns the last successfully fetched state without touching the store.
    #[must_use]
    pub fn current(&self) -> DailyLimitInfo {
        self.info.borrow().clone()
    }

    /// Observes every successfully fetched state.
    #[must_use]
    pub fn observe(&self) -> watch::Receiver<DailyLimitInfo> {
        self.info.subscribe()
    }

    /// Forgets the cached value so the next fetch reads the store.
    pub fn invalidate(&self) {
        *self.fetched.lock() = None;
    }

    /// Returns today's quota, reading the store unless a value for today is
    /// still cached.
    pub async fn fetch(&self, force_refresh: bool) -> DailyLimitInfo {
        self.fetch_on(Utc::now().date_naive(), force_refresh).await
    }

    /// Returns the quota for `date`.
    ///
    /// A store error is logged and reported as an untouched quota; the
    /// cache and the observed state are left alone in that case.
    pub async fn fetch_on(&self, date: NaiveDate, force_refresh: bool) -> DailyLimitInfo {
        let cached = *self.fetched.lock();
        if !force_refresh
            && let Some(fetched) = cached
            && fetched.date == date
            && fetched.at.elapsed() < self.cache_ttl
        {
            return self.current();
        }

        let document_id = counter_document_id(date);
        match self.store.get_all(&self.collection).await {
            Ok(documents) => {
                let count = documents
                    .iter()
                    .find(|document| document.id == document_id)
                    .map_or(0, |document| count_field(&document.data));
                let info = DailyLimitInfo::new(count, self.max_limit, date);
                self.info.send_replace(info.clone());
                *self.fetched.lock() = Some(Fetched {
                    at: Instant::now(),
                    date,
                });
                tracing::debug!(%document_id, count, limit = self.max_limit, "Daily limit fetched");
                info
            }
            Err(error) => {
                tracing::warn!(
                    collection = %self.collection,
                    %document_id,
                    %error,
                    "Failed to read daily limit, assuming an untouched quota"
                );
                DailyLimitInfo::fresh(self.max_limit, date)
            }
        }
    }
}
