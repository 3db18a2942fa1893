// Path: crates/chain/src/cache.rs

//! Deadline-bounded, TTL-cached decorators over the chain seams.

use async_trait::async_trait;
use bytecave_api::chain::{AppRegistry, ChainClient, GroupRecord};
use bytecave_types::error::ChainError;
use bytecave_types::peer::PeerRecord;
use bytecave_types::Cid;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Positive and negative CID-presence results are held this long.
const CID_PRESENCE_TTL: Duration = Duration::from_secs(3600);
/// Positive app-registry results are held this long.
const APP_AUTH_TTL: Duration = Duration::from_secs(60);

struct TtlCache<K, V> {
    entries: DashMap<K, (V, Instant)>,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    fn new(ttl: Duration) -> Self {
        TtlCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key)?;
        let (value, at) = hit.value();
        if at.elapsed() > self.ttl {
            drop(hit);
            self.entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    fn put(&self, key: K, value: V) {
        self.entries.insert(key, (value, Instant::now()));
    }
}

async fn bounded<T, F>(deadline: Duration, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(res) => res,
        Err(_) => Err(ChainError::Timeout),
    }
}

/// Wraps a `ChainClient`, bounding every RPC with a deadline and caching the
/// CID-presence lookups used by the replication intake.
pub struct CachingChainClient<C> {
    inner: Arc<C>,
    deadline: Duration,
    cid_presence: TtlCache<Cid, bool>,
}

impl<C: ChainClient> CachingChainClient<C> {
    pub fn new(inner: Arc<C>, deadline: Duration) -> Self {
        CachingChainClient {
            inner,
            deadline,
            cid_presence: TtlCache::new(CID_PRESENCE_TTL),
        }
    }

    /// Whether any authorized on-chain record (post or message) references
    /// this CID. Results, positive or negative, are cached for an hour.
    pub async fn is_cid_on_chain(&self, cid: &Cid) -> Result<bool, ChainError> {
        if let Some(hit) = self.cid_presence.get(cid) {
            return Ok(hit);
        }
        let found = bounded(self.deadline, self.inner.get_post_by_cid(cid)).await?
            || bounded(self.deadline, self.inner.get_message_by_cid(cid)).await?;
        self.cid_presence.put(*cid, found);
        Ok(found)
    }
}

#[async_trait]
impl<C: ChainClient> ChainClient for CachingChainClient<C> {
    async fn is_node_active(&self, node_id_hash: &str) -> Result<bool, ChainError> {
        bounded(self.deadline, self.inner.is_node_active(node_id_hash)).await
    }

    async fn get_node(&self, node_id_hash: &str) -> Result<Option<PeerRecord>, ChainError> {
        bounded(self.deadline, self.inner.get_node(node_id_hash)).await
    }

    async fn get_group_token(
        &self,
        group_posts_address: &str,
    ) -> Result<Option<String>, ChainError> {
        bounded(self.deadline, self.inner.get_group_token(group_posts_address)).await
    }

    async fn get_group_by_token(
        &self,
        token_address: &str,
    ) -> Result<Option<GroupRecord>, ChainError> {
        bounded(self.deadline, self.inner.get_group_by_token(token_address)).await
    }

    async fn is_member(&self, address: &str, group_token: &str) -> Result<bool, ChainError> {
        bounded(self.deadline, self.inner.is_member(address, group_token)).await
    }

    async fn get_post_by_cid(&self, cid: &Cid) -> Result<bool, ChainError> {
        bounded(self.deadline, self.inner.get_post_by_cid(cid)).await
    }

    async fn get_message_by_cid(&self, cid: &Cid) -> Result<bool, ChainError> {
        bounded(self.deadline, self.inner.get_message_by_cid(cid)).await
    }

    async fn register_node(&self, record: &PeerRecord) -> Result<(), ChainError> {
        bounded(self.deadline, self.inner.register_node(record)).await
    }
}

/// Wraps an `AppRegistry` with a short positive cache, so a burst of writes
/// from one app costs a single registry round trip.
pub struct CachingAppRegistry<R> {
    inner: Arc<R>,
    deadline: Duration,
    authorized: TtlCache<(String, String), ()>,
}

impl<R: AppRegistry> CachingAppRegistry<R> {
    pub fn new(inner: Arc<R>, deadline: Duration) -> Self {
        CachingAppRegistry {
            inner,
            deadline,
            authorized: TtlCache::new(APP_AUTH_TTL),
        }
    }
}

#[async_trait]
impl<R: AppRegistry> AppRegistry for CachingAppRegistry<R> {
    async fn available(&self) -> bool {
        self.inner.available().await
    }

    async fn is_app_authorized(&self, app_id: &str, sender: &str) -> Result<bool, ChainError> {
        let key = (app_id.to_string(), sender.to_string());
        if self.authorized.get(&key).is_some() {
            return Ok(true);
        }
        let ok = bounded(self.deadline, self.inner.is_app_authorized(app_id, sender)).await?;
        if ok {
            // Only positive results are cached; a rejected pair must be able
            // to succeed immediately after on-chain authorization.
            self.authorized.put(key, ());
        }
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockChain;
    use bytecave_types::Cid;

    fn cid(byte: u8) -> Cid {
        Cid::from_digest([byte; 32])
    }

    #[tokio::test]
    async fn cid_presence_is_cached() {
        let mock = Arc::new(MockChain::new());
        mock.add_post_cid(cid(1));
        let client = CachingChainClient::new(mock.clone(), Duration::from_secs(1));

        assert!(client.is_cid_on_chain(&cid(1)).await.unwrap());
        assert!(!client.is_cid_on_chain(&cid(2)).await.unwrap());
        let calls_after_first = mock.call_count();

        // Repeats are served from cache.
        assert!(client.is_cid_on_chain(&cid(1)).await.unwrap());
        assert!(!client.is_cid_on_chain(&cid(2)).await.unwrap());
        assert_eq!(mock.call_count(), calls_after_first);
    }

    #[tokio::test]
    async fn app_registry_caches_positive_only() {
        let mock = Arc::new(MockChain::new());
        mock.authorize_app("hashd", "0xaaa");
        let registry = CachingAppRegistry::new(mock.clone(), Duration::from_secs(1));

        assert!(registry.is_app_authorized("hashd", "0xaaa").await.unwrap());
        assert!(!registry.is_app_authorized("hashd", "0xbbb").await.unwrap());
        let calls = mock.call_count();

        assert!(registry.is_app_authorized("hashd", "0xaaa").await.unwrap());
        // The negative result was not cached, so the registry is asked again.
        assert!(!registry.is_app_authorized("hashd", "0xbbb").await.unwrap());
        assert_eq!(mock.call_count(), calls + 1);
    }

    #[tokio::test]
    async fn slow_chain_times_out() {
        let mock = Arc::new(MockChain::new().with_latency(Duration::from_millis(200)));
        let client = CachingChainClient::new(mock, Duration::from_millis(10));
        assert!(matches!(
            client.is_node_active("deadbeef").await,
            Err(ChainError::Timeout)
        ));
    }
}
