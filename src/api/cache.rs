use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;

use super::transport::{normalize_base_url, normalize_endpoint, query_pairs, ApiRequest, ApiResponse, Transport};

const DEFAULT_TTL: Duration = Duration::from_millis(1_800);
const TERRAIN_TTL: Duration = Duration::from_secs(900);
const MAX_ENTRIES: usize = 2_048;

struct CacheEntry {
    response: ApiResponse,
    expires_at: Instant,
}

/// TTL cache over successful GET responses.
///
/// Short default TTL collapses the bursts a dashboard refresh produces;
/// room terrain never changes within a session so it gets a long TTL. When
/// the cache is full the entry closest to expiry is evicted.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    capacity: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { entries: Mutex::new(HashMap::new()), capacity }
    }

    fn ttl_for(endpoint: &str) -> Duration {
        if endpoint.eq_ignore_ascii_case("/api/game/room-terrain") {
            TERRAIN_TTL
        } else {
            DEFAULT_TTL
        }
    }

    fn get(&self, key: &str) -> Option<ApiResponse> {
        let mut entries = self.entries.lock().ok()?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.get(key).map(|entry| entry.response.clone())
    }

    fn put(&self, key: String, response: &ApiResponse, ttl: Duration) {
        if !response.ok || ttl.is_zero() {
            return;
        }
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        if entries.len() >= self.capacity {
            if let Some(soonest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone())
            {
                entries.remove(&soonest);
            }
        }
        entries.insert(key, CacheEntry { response: response.clone(), expires_at: now + ttl });
    }
}

/// Identity of a GET request for cache lookup. Returns None for requests
/// that cannot be cached (non-GET or an unparseable base URL, which the
/// inner transport will reject anyway).
fn cache_key(request: &ApiRequest) -> Option<(String, String)> {
    if !request.method.eq_ignore_ascii_case("GET") {
        return None;
    }
    let base_url = normalize_base_url(&request.base_url).ok()?;
    let endpoint = normalize_endpoint(&request.endpoint);
    let pairs = request.query.as_ref().map(query_pairs).unwrap_or_default();
    let query_part = serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string());
    let token = request.token.as_deref().map(str::trim).unwrap_or("");
    let username = request.username.as_deref().map(str::trim).unwrap_or("");
    let key = format!("GET|{}|{}|{}|{}|{}", base_url, endpoint, query_part, token, username);
    Some((key, endpoint))
}

/// Transport decorator that serves repeat GETs from the response cache.
pub struct CachedTransport<T: Transport> {
    inner: T,
    cache: ResponseCache,
}

impl<T: Transport> CachedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner, cache: ResponseCache::new() }
    }
}

#[async_trait]
impl<T: Transport> Transport for CachedTransport<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let Some((key, endpoint)) = cache_key(&request) else {
            return self.inner.send(request).await;
        };
        if let Some(cached) = self.cache.get(&key) {
            debug!("cache hit for {}", endpoint);
            return Ok(cached);
        }
        let response = self.inner.send(request).await?;
        self.cache.put(key, &response, ResponseCache::ttl_for(&endpoint));
        Ok(response)
    }
}
