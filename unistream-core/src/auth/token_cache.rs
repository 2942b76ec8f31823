//! Credential token cache
//!
//! An explicitly owned cache handle that event sources receive at
//! construction. Clones share the same entries.

use super::secret::SecretString;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Default margin before expiry at which a token is refreshed
pub const DEFAULT_REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token source '{source_name}' failed: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },
}

/// A token and when it stops being valid
#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(token: impl Into<SecretString>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Valid at `now` with at least `skew` to spare
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now + skew < self.expires_at
    }
}

/// Where tokens come from when the cache misses
#[async_trait]
pub trait TokenSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, key: &str) -> Result<CachedToken, TokenError>;
}

/// Shared token cache
///
/// Refreshes are single-flight per key: concurrent misses on one key wait
/// for a single fetch, while other keys stay readable during it.
#[derive(Debug, Clone)]
pub struct TokenCache {
    entries: Arc<RwLock<HashMap<String, CachedToken>>>,
    refreshing: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    refresh_skew: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_refresh_skew(Duration::seconds(DEFAULT_REFRESH_SKEW_SECS))
    }

    pub fn with_refresh_skew(refresh_skew: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            refreshing: Arc::new(Mutex::new(HashMap::new())),
            refresh_skew,
        }
    }

    /// Cached token for `key`, fetched from `source` when missing or stale
    pub async fn get(
        &self,
        key: &str,
        source: &dyn TokenSource,
    ) -> Result<SecretString, TokenError> {
        if let Some(token) = self.fresh(key).await {
            return Ok(token);
        }

        let flight = self.flight(key).await;
        let _guard = flight.lock().await;
        // Another task may have refreshed while we waited for the key
        if let Some(token) = self.fresh(key).await {
            return Ok(token);
        }

        debug!(key = %key, source = %source.name(), "fetching token");
        let fetched = source.fetch(key).await?;
        let token = fetched.token.clone();
        self.entries.write().await.insert(key.to_string(), fetched);
        Ok(token)
    }

    /// Store a token directly
    pub async fn insert(&self, key: impl Into<String>, token: CachedToken) {
        self.entries.write().await.insert(key.into(), token);
    }

    /// Drop one entry, e.g. after the upstream rejected it
    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn flight(&self, key: &str) -> Arc<Mutex<()>> {
        let mut refreshing = self.refreshing.lock().await;
        refreshing.entry(key.to_string()).or_default().clone()
    }

    async fn fresh(&self, key: &str) -> Option<SecretString> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|cached| cached.is_fresh(Utc::now(), self.refresh_skew))
            .map(|cached| cached.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        lifetime: Duration,
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch(&self, key: &str) -> Result<CachedToken, TokenError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CachedToken::new(
                format!("{}-{}", key, n),
                Utc::now() + self.lifetime,
            ))
        }
    }

    #[tokio::test]
    async fn test_fresh_token_is_reused() {
        let cache = TokenCache::new();
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            lifetime: Duration::hours(1),
        };

        let first = cache.get("svc", &source).await.unwrap();
        let second = cache.get("svc", &source).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_inside_skew_is_refreshed() {
        let cache = TokenCache::with_refresh_skew(Duration::minutes(5));
        let source = CountingSource {
            calls: AtomicUsize::new(0),
            lifetime: Duration::minutes(1),
        };

        cache.get("svc", &source).await.unwrap();
        let second = cache.get("svc", &source).await.unwrap();
        assert_eq!(second.expose_secret(), "svc-1");
    }

    #[tokio::test]
    async fn test_invalidate_and_clones_share_state() {
        let cache = TokenCache::new();
        let handle = cache.clone();
        handle
            .insert("a", CachedToken::new("t", Utc::now() + Duration::hours(1)))
            .await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert!(handle.is_empty().await);
    }

    /// Holds fetches for `slow` until a permit is released
    struct GatedSource {
        gate: tokio::sync::Semaphore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for GatedSource {
        fn name(&self) -> &str {
            "gated"
        }

        async fn fetch(&self, key: &str) -> Result<CachedToken, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if key == "slow" {
                let _permit = self.gate.acquire().await.map_err(|err| TokenError::Fetch {
                    source_name: "gated".into(),
                    message: err.to_string(),
                })?;
            }
            Ok(CachedToken::new(format!("{}-token", key), Utc::now() + Duration::hours(1)))
        }
    }

    #[tokio::test]
    async fn test_slow_refresh_does_not_block_other_keys() {
        let cache = TokenCache::new();
        let source = Arc::new(GatedSource {
            gate: tokio::sync::Semaphore::new(0),
            calls: AtomicUsize::new(0),
        });

        let slow = {
            let (cache, source) = (cache.clone(), source.clone());
            tokio::spawn(async move { cache.get("slow", source.as_ref()).await })
        };
        let waiter = {
            let (cache, source) = (cache.clone(), source.clone());
            tokio::spawn(async move { cache.get("slow", source.as_ref()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let fast = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            cache.get("fast", source.as_ref()),
        )
        .await
        .expect("other keys stay available during a refresh")
        .unwrap();
        assert_eq!(fast.expose_secret(), "fast-token");

        source.gate.add_permits(1);
        assert_eq!(slow.await.unwrap().unwrap().expose_secret(), "slow-token");
        assert_eq!(waiter.await.unwrap().unwrap().expose_secret(), "slow-token");
        // One fetch for `slow` shared by both callers, one for `fast`
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_token_never_printed() {
        let token = CachedToken::new("super-secret-token", Utc::now());
        let printed = format!("{:?}", token);
        assert!(!printed.contains("super-secret-token"));
    }
}
