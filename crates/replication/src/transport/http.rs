// Path: crates/replication/src/transport/http.rs

//! The HTTP fallback transport: plain REST calls against a peer's public
//! surface. The preferred P2P protocol is a separate collaborator; this
//! transport is what every vault can always fall back to.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytecave_api::transport::{PeerHealth, PeerTransport, ReplicaMeta, ReplicateAck, TransportError};
use bytecave_types::peer::PeerRecord;
use bytecave_types::Cid;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplicateRequest<'a> {
    cid: String,
    /// Ciphertext, base64.
    data: String,
    mime_type: &'a str,
    peer_public_key: &'a str,
    #[serde(flatten)]
    meta: &'a ReplicaMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplicateResponse {
    stored: bool,
    #[serde(default)]
    already_stored: bool,
}

/// Dials peers over their HTTP endpoints with one shared client.
pub struct HttpPeerTransport {
    client: reqwest::Client,
    /// The local node's public key, presented on every push.
    public_key: String,
}

impl HttpPeerTransport {
    pub fn new(timeout: Duration, public_key: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(HttpPeerTransport {
            client,
            public_key: public_key.into(),
        })
    }

    fn classify(e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Protocol(e.to_string())
        }
    }

    async fn rejected(response: reqwest::Response) -> TransportError {
        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        TransportError::Rejected {
            code: body
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or(status.as_str())
                .to_string(),
            message: body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn replicate(
        &self,
        peer: &PeerRecord,
        cid: &Cid,
        bytes: &[u8],
        mime_type: &str,
        meta: &ReplicaMeta,
    ) -> Result<ReplicateAck, TransportError> {
        let url = format!("{}/replicate", peer.endpoint.trim_end_matches('/'));
        let request = ReplicateRequest {
            cid: cid.to_hex(),
            data: BASE64.encode(bytes),
            mime_type,
            peer_public_key: &self.public_key,
            meta,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(Self::classify)?;
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let ack: ReplicateResponse = response.json().await.map_err(Self::classify)?;
        Ok(ReplicateAck {
            stored: ack.stored,
            already_stored: ack.already_stored,
        })
    }

    async fn fetch_blob(
        &self,
        peer: &PeerRecord,
        cid: &Cid,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let url = format!("{}/blob/{}", peer.endpoint.trim_end_matches('/'), cid);
        let response = self.client.get(&url).send().await.map_err(Self::classify)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }
        let bytes = response.bytes().await.map_err(Self::classify)?;
        Ok(Some(bytes.to_vec()))
    }

    async fn probe_has(&self, peer: &PeerRecord, cid: &Cid) -> Result<bool, TransportError> {
        let url = format!("{}/blob/{}", peer.endpoint.trim_end_matches('/'), cid);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(Self::classify)?;
        Ok(response.status().is_success())
    }

    async fn health(&self, peer: &PeerRecord) -> Result<PeerHealth, TransportError> {
        let url = format!("{}/health", peer.endpoint.trim_end_matches('/'));
        let started = Instant::now();
        let response = self.client.get(&url).send().await.map_err(Self::classify)?;
        Ok(PeerHealth {
            healthy: response.status().is_success(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}
