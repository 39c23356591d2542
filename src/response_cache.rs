// Short-lived memoization of upstream JSON payloads, keyed by request URL

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::go_api_models::{JsonFetcher, Result};

pub const CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Arc<Value>,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub ttl_seconds: u64,
}

/// Only successful payloads are stored; a failed fetch is retried on the
/// next access. Entries expire by age and are never evicted otherwise.
pub struct ResponseCache {
    fetcher: Arc<dyn JsonFetcher>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self::with_ttl(fetcher, CACHE_TTL)
    }

    pub fn with_ttl(fetcher: Arc<dyn JsonFetcher>, ttl: Duration) -> Self {
        ResponseCache {
            fetcher,
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get_or_fetch(&self, url: &str) -> Result<Arc<Value>> {
        self.get_or_fetch_at(url, Instant::now())
    }

    pub fn get_or_fetch_at(&self, url: &str, now: Instant) -> Result<Arc<Value>> {
        if let Some(entry) = self.entries().get(url) {
            if entry.is_fresh(self.ttl, now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", url);
                return Ok(entry.payload.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for {}, fetching", url);

        // The lock is released while fetching; a concurrent miss just overwrites.
        let payload = Arc::new(self.fetcher.fetch(url)?);
        self.entries().insert(
            url.to_string(),
            CacheEntry {
                payload: payload.clone(),
                fetched_at: now,
            },
        );

        Ok(payload)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ttl_seconds: self.ttl.as_secs(),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::go_api_models::GoApiError;
    use crate::go_api_models::tests::FakeFetcher;
    use serde_json::json;

    const URL: &str = "https://ttc-alerts-api.vercel.app/api/go?type=stats";

    fn stats_payload() -> Value {
        json!([{"metric": "Total Vehicles", "value": 180}])
    }

    #[test]
    fn repeated_access_within_ttl_hits_upstream_once() {
        let fetcher = FakeFetcher::new(vec![(URL.to_string(), stats_payload())]);
        let cache = ResponseCache::new(fetcher.clone());
        let t0 = Instant::now();

        let first = cache.get_or_fetch_at(URL, t0).unwrap();
        let second = cache.get_or_fetch_at(URL, t0 + Duration::from_secs(59)).unwrap();

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(
            serde_json::to_vec(first.as_ref()).unwrap(),
            serde_json::to_vec(second.as_ref()).unwrap()
        );
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn access_after_ttl_refetches() {
        let fetcher = FakeFetcher::new(vec![(URL.to_string(), stats_payload())]);
        let cache = ResponseCache::new(fetcher.clone());
        let t0 = Instant::now();

        cache.get_or_fetch_at(URL, t0).unwrap();
        cache.get_or_fetch_at(URL, t0 + Duration::from_secs(60)).unwrap();
        assert_eq!(fetcher.calls(), 2);

        // the refetch restarts the window
        cache.get_or_fetch_at(URL, t0 + Duration::from_secs(90)).unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let fetcher = FakeFetcher::new(vec![]);
        let cache = ResponseCache::new(fetcher.clone());
        let t0 = Instant::now();

        assert!(matches!(cache.get_or_fetch_at(URL, t0), Err(GoApiError::StatusError(404))));
        assert!(cache.get_or_fetch_at(URL, t0 + Duration::from_secs(1)).is_err());
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(cache.stats().entries, 0);

        fetcher.responses.lock().unwrap().insert(URL.to_string(), stats_payload());
        assert!(cache.get_or_fetch_at(URL, t0 + Duration::from_secs(2)).is_ok());
        assert_eq!(fetcher.calls(), 3);
    }

    #[test]
    fn entries_are_keyed_by_url() {
        let other = "https://ttc-alerts-api.vercel.app/api/go?type=union";
        let fetcher = FakeFetcher::new(vec![
            (URL.to_string(), stats_payload()),
            (other.to_string(), json!([])),
        ]);
        let cache = ResponseCache::new(fetcher.clone());
        let t0 = Instant::now();

        cache.get_or_fetch_at(URL, t0).unwrap();
        cache.get_or_fetch_at(other, t0).unwrap();
        cache.get_or_fetch_at(URL, t0).unwrap();

        let stats = cache.stats();
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(stats.entries, 2);
        assert_eq!((stats.hits, stats.misses), (1, 2));
        assert_eq!(stats.ttl_seconds, 60);
    }
}
