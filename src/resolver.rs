use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::cache::GeocodeCache;
use crate::distance::Coordinate;
use crate::errors::AppResult;
use crate::geocoder::{AddressLookup, ResolutionOutcome};
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub cache_hits: usize,
    pub remote_calls: usize,
}

pub struct AddressResolver {
    lookup: Arc<dyn AddressLookup>,
    cache: Arc<GeocodeCache>,
    rate_limiter: Arc<RateLimiter>,
    cache_hits: AtomicUsize,
    remote_calls: AtomicUsize,
}

impl AddressResolver {
    pub fn new(
        lookup: Arc<dyn AddressLookup>,
        cache: Arc<GeocodeCache>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            lookup,
            cache,
            rate_limiter,
            cache_hits: AtomicUsize::new(0),
            remote_calls: AtomicUsize::new(0),
        }
    }

    pub fn cache(&self) -> &Arc<GeocodeCache> {
        &self.cache
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
        }
    }

    pub async fn resolve(&self, line1: &str, line2: &str) -> AppResult<ResolutionOutcome> {
        let full_key = full_key(line1, line2);
        if let Some(coordinate) = self.resolve_key(&full_key).await? {
            return Ok(ResolutionOutcome::Resolved(coordinate));
        }

        let fallback_key = line1.trim();
        if line2.trim().is_empty() || fallback_key.is_empty() || fallback_key == full_key {
            return Ok(ResolutionOutcome::NotFound);
        }

        debug!(full_key = %full_key, fallback_key, "retrying address lookup with line 1 only");
        match self.resolve_key(fallback_key).await? {
            Some(coordinate) => {
                self.cache.put(full_key, coordinate);
                Ok(ResolutionOutcome::Resolved(coordinate))
            }
            None => Ok(ResolutionOutcome::NotFound),
        }
    }

    async fn resolve_key(&self, key: &str) -> AppResult<Option<Coordinate>> {
        if let Some(coordinate) = self.cache.get(key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, "geocode cache hit");
            return Ok(Some(coordinate));
        }

        self.rate_limiter.wait().await;
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
        let outcome = self.lookup.lookup(key).await?;
        if let ResolutionOutcome::Resolved(coordinate) = outcome {
            self.cache.put(key, coordinate);
        }
        Ok(outcome.coordinate())
    }
}

fn full_key(line1: &str, line2: &str) -> String {
    format!("{line1} {line2}").trim().to_string()
}
