// Path: crates/chain/src/rest.rs

//! A thin REST client against the federation's chain indexer. The indexer
//! fronts the actual contracts; the vault only ever asks yes/no questions
//! and fetches small records, so plain GETs with 404-as-absent suffice.

use async_trait::async_trait;
use bytecave_api::chain::{AppRegistry, ChainClient, GroupRecord};
use bytecave_types::error::ChainError;
use bytecave_types::peer::PeerRecord;
use bytecave_types::Cid;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// REST access to the chain indexer at `base_url`.
pub struct RestChainClient {
    base_url: String,
    client: reqwest::Client,
}

impl RestChainClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        Ok(RestChainClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn classify(e: reqwest::Error) -> ChainError {
        if e.is_timeout() {
            ChainError::Timeout
        } else {
            ChainError::Rpc(e.to_string())
        }
    }

    /// GET returning `Ok(None)` on 404.
    async fn get_opt<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, ChainError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(Self::classify)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!(
                "{} from {path}",
                response.status()
            )));
        }
        response.json().await.map(Some).map_err(Self::classify)
    }

    /// GET where existence is the answer.
    async fn exists(&self, path: &str) -> Result<bool, ChainError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(Self::classify)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!(
                "{} from {path}",
                response.status()
            )));
        }
        Ok(true)
    }
}

#[async_trait]
impl ChainClient for RestChainClient {
    async fn is_node_active(&self, node_id_hash: &str) -> Result<bool, ChainError> {
        Ok(self
            .get_opt::<PeerRecord>(&format!("/nodes/{node_id_hash}"))
            .await?
            .map(|n| n.active)
            .unwrap_or(false))
    }

    async fn get_node(&self, node_id_hash: &str) -> Result<Option<PeerRecord>, ChainError> {
        self.get_opt(&format!("/nodes/{node_id_hash}")).await
    }

    async fn get_group_token(
        &self,
        group_posts_address: &str,
    ) -> Result<Option<String>, ChainError> {
        Ok(self
            .get_opt::<TokenResponse>(&format!("/group-posts/{group_posts_address}/token"))
            .await?
            .map(|r| r.token))
    }

    async fn get_group_by_token(
        &self,
        token_address: &str,
    ) -> Result<Option<GroupRecord>, ChainError> {
        self.get_opt(&format!("/groups/{token_address}")).await
    }

    async fn is_member(&self, address: &str, group_token: &str) -> Result<bool, ChainError> {
        self.exists(&format!("/groups/{group_token}/members/{address}"))
            .await
    }

    async fn get_post_by_cid(&self, cid: &Cid) -> Result<bool, ChainError> {
        self.exists(&format!("/posts/{cid}")).await
    }

    async fn get_message_by_cid(&self, cid: &Cid) -> Result<bool, ChainError> {
        self.exists(&format!("/messages/{cid}")).await
    }

    async fn register_node(&self, record: &PeerRecord) -> Result<(), ChainError> {
        let response = self
            .client
            .post(self.url("/nodes"))
            .json(record)
            .send()
            .await
            .map_err(Self::classify)?;
        if !response.status().is_success() {
            return Err(ChainError::Rpc(format!(
                "registration rejected: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AppRegistry for RestChainClient {
    async fn available(&self) -> bool {
        self.client
            .get(self.url("/healthz"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn is_app_authorized(&self, app_id: &str, sender: &str) -> Result<bool, ChainError> {
        self.exists(&format!("/apps/{app_id}/senders/{sender}"))
            .await
    }
}
