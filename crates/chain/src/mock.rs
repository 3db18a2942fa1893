// Path: crates/chain/src/mock.rs

//! An in-memory chain for tests and local development. Every lookup counts
//! against `call_count` so caching behavior is observable.

use async_trait::async_trait;
use bytecave_api::chain::{AppRegistry, ChainClient, GroupRecord};
use bytecave_types::error::ChainError;
use bytecave_types::peer::PeerRecord;
use bytecave_types::Cid;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    nodes: HashMap<String, PeerRecord>,
    group_tokens: HashMap<String, String>,
    groups: HashMap<String, GroupRecord>,
    members: HashSet<(String, String)>,
    posts: HashSet<Cid>,
    messages: HashSet<Cid>,
    authorized_apps: HashSet<(String, String)>,
}

/// A chain whose contents are set directly by the test.
pub struct MockChain {
    state: RwLock<MockState>,
    calls: AtomicU64,
    available: AtomicBool,
    latency: Option<Duration>,
}

impl MockChain {
    pub fn new() -> Self {
        MockChain {
            state: RwLock::new(MockState::default()),
            calls: AtomicU64::new(0),
            available: AtomicBool::new(true),
            latency: None,
        }
    }

    /// Every lookup sleeps this long first, for timeout tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn add_node(&self, node_id_hash: impl Into<String>, record: PeerRecord) {
        self.state.write().nodes.insert(node_id_hash.into(), record);
    }

    pub fn set_group_token(
        &self,
        group_posts_address: impl Into<String>,
        token: impl Into<String>,
    ) {
        self.state
            .write()
            .group_tokens
            .insert(group_posts_address.into(), token.into());
    }

    pub fn add_group(&self, token_address: impl Into<String>, owner: impl Into<String>) {
        let token_address = token_address.into();
        let record = GroupRecord {
            owner: owner.into(),
            token: token_address.clone(),
        };
        self.state.write().groups.insert(token_address, record);
    }

    pub fn add_member(&self, address: impl Into<String>, token: impl Into<String>) {
        let address: String = address.into();
        self.state
            .write()
            .members
            .insert((address.to_ascii_lowercase(), token.into()));
    }

    pub fn add_post_cid(&self, cid: Cid) {
        self.state.write().posts.insert(cid);
    }

    pub fn add_message_cid(&self, cid: Cid) {
        self.state.write().messages.insert(cid);
    }

    pub fn authorize_app(&self, app_id: impl Into<String>, sender: impl Into<String>) {
        let sender: String = sender.into();
        self.state
            .write()
            .authorized_apps
            .insert((app_id.into(), sender.to_ascii_lowercase()));
    }

    async fn touch(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn is_node_active(&self, node_id_hash: &str) -> Result<bool, ChainError> {
        self.touch().await;
        Ok(self
            .state
            .read()
            .nodes
            .get(node_id_hash)
            .map(|n| n.active)
            .unwrap_or(false))
    }

    async fn get_node(&self, node_id_hash: &str) -> Result<Option<PeerRecord>, ChainError> {
        self.touch().await;
        Ok(self.state.read().nodes.get(node_id_hash).cloned())
    }

    async fn get_group_token(
        &self,
        group_posts_address: &str,
    ) -> Result<Option<String>, ChainError> {
        self.touch().await;
        Ok(self.state.read().group_tokens.get(group_posts_address).cloned())
    }

    async fn get_group_by_token(
        &self,
        token_address: &str,
    ) -> Result<Option<GroupRecord>, ChainError> {
        self.touch().await;
        Ok(self.state.read().groups.get(token_address).cloned())
    }

    async fn is_member(&self, address: &str, group_token: &str) -> Result<bool, ChainError> {
        self.touch().await;
        Ok(self
            .state
            .read()
            .members
            .contains(&(address.to_ascii_lowercase(), group_token.to_string())))
    }

    async fn get_post_by_cid(&self, cid: &Cid) -> Result<bool, ChainError> {
        self.touch().await;
        Ok(self.state.read().posts.contains(cid))
    }

    async fn get_message_by_cid(&self, cid: &Cid) -> Result<bool, ChainError> {
        self.touch().await;
        Ok(self.state.read().messages.contains(cid))
    }

    async fn register_node(&self, record: &PeerRecord) -> Result<(), ChainError> {
        self.touch().await;
        let hash = record.node_id.clone();
        self.state.write().nodes.insert(hash, record.clone());
        Ok(())
    }
}

#[async_trait]
impl AppRegistry for MockChain {
    async fn available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    async fn is_app_authorized(&self, app_id: &str, sender: &str) -> Result<bool, ChainError> {
        self.touch().await;
        if !self.available.load(Ordering::Relaxed) {
            return Err(ChainError::Rpc("registry offline".into()));
        }
        Ok(self
            .state
            .read()
            .authorized_apps
            .contains(&(app_id.to_string(), sender.to_ascii_lowercase())))
    }
}
