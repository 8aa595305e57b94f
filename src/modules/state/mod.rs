//! Clearance cookie storage.
//!
//! Credentials are keyed by normalized domain. The in-memory store shards its
//! entries across independently locked buckets so that callers working on
//! different domains rarely meet on the same lock, while operations on one
//! domain are serialized by that domain's bucket.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::challenges::core::{ClearanceCookie, normalize_domain, now_millis};

const SHARD_COUNT: usize = 16;

/// Keyed cache of clearance credentials.
///
/// Every method accepts either a full URL or a bare host; implementations must
/// key entries with [`normalize_domain`]. A durable adapter only has to honour
/// this contract to be swapped in for [`InMemoryCookieStore`].
pub trait CookieStore: Send + Sync {
    /// Store `cookie`, replacing any entry for the same domain.
    fn save_clearance_cookie(&self, url_or_domain: &str, cookie: ClearanceCookie);

    /// The stored cookie, only while it is still valid.
    fn get_clearance_cookie(&self, url_or_domain: &str) -> Option<ClearanceCookie>;

    fn invalidate(&self, url_or_domain: &str);

    fn clear_all(&self);

    /// Unfiltered snapshot of every entry, expired ones included.
    fn get_all(&self) -> Vec<(String, ClearanceCookie)>;

    fn is_valid(&self, cookie: &ClearanceCookie) -> bool {
        cookie.is_valid()
    }
}

type Shard = RwLock<HashMap<String, ClearanceCookie>>;

/// Thread-safe in-memory cookie store.
#[derive(Clone, Debug)]
pub struct InMemoryCookieStore {
    shards: Arc<[Shard]>,
}

impl InMemoryCookieStore {
    pub fn new() -> Self {
        let shards: Vec<Shard> = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards: shards.into(),
        }
    }

    fn shard(&self, domain: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        domain.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<String, ClearanceCookie>> {
        shard.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<String, ClearanceCookie>> {
        shard.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_millis();
        self.shards
            .iter()
            .map(|shard| {
                let mut guard = Self::write(shard);
                let before = guard.len();
                guard.retain(|_, cookie| !cookie.is_expired_at(now));
                before - guard.len()
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| Self::read(shard).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| Self::read(shard).is_empty())
    }
}

impl Default for InMemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieStore for InMemoryCookieStore {
    fn save_clearance_cookie(&self, url_or_domain: &str, cookie: ClearanceCookie) {
        let domain = normalize_domain(url_or_domain);
        log::debug!(
            "storing clearance for {} (expires at {})",
            domain,
            cookie.expires_at_ms()
        );
        let shard = self.shard(&domain);
        Self::write(shard).insert(domain, cookie);
    }

    fn get_clearance_cookie(&self, url_or_domain: &str) -> Option<ClearanceCookie> {
        let domain = normalize_domain(url_or_domain);
        let shard = self.shard(&domain);
        let now = now_millis();

        let expired = {
            let guard = Self::read(shard);
            match guard.get(&domain) {
                None => return None,
                Some(cookie) if cookie.is_valid_at(now) => return Some(cookie.clone()),
                Some(cookie) => cookie.is_expired_at(now),
            }
        };

        // Lazy eviction; re-check under the write lock in case a fresh cookie
        // was saved in between.
        if expired {
            let mut guard = Self::write(shard);
            if guard
                .get(&domain)
                .is_some_and(|cookie| cookie.is_expired_at(now_millis()))
            {
                guard.remove(&domain);
                log::debug!("evicted expired clearance for {}", domain);
            }
        }
        None
    }

    fn invalidate(&self, url_or_domain: &str) {
        let domain = normalize_domain(url_or_domain);
        let shard = self.shard(&domain);
        if Self::write(shard).remove(&domain).is_some() {
            log::debug!("invalidated clearance for {}", domain);
        }
    }

    fn clear_all(&self) {
        for shard in self.shards.iter() {
            Self::write(shard).clear();
        }
    }

    fn get_all(&self) -> Vec<(String, ClearanceCookie)> {
        self.shards
            .iter()
            .flat_map(|shard| {
                Self::read(shard)
                    .iter()
                    .map(|(domain, cookie)| (domain.clone(), cookie.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
