// Path: crates/node/tests/vault_e2e.rs

//! End-to-end exercises of the composed vault: authorized writes with
//! replication, shard rejection, replay defense, GC safety, and the read
//! path under dishonest or censoring replicas.

use bytecave_chain::MockChain;
use bytecave_crypto::{build_auth_message, cid_of, eth_address_of_pubkey, keccak256, thread_id_for};
use bytecave_gateway::{StoreRequest, VaultApi};
use bytecave_node::{Vault, VaultOptions};
use bytecave_peers::registry::test_peer;
use bytecave_replication::transport::{InMemoryFederation, PeerBehavior};
use bytecave_types::auth::{AuthKind, AuthorizationRecord};
use bytecave_types::config::NodeConfig;
use bytecave_types::error::{ErrorCode, VaultError};
use bytecave_types::{now_millis, Cid};
use k256::ecdsa::{signature::hazmat::PrehashSigner, RecoveryId, Signature, SigningKey};
use std::sync::Arc;
use std::time::Duration;

type TestVault = Arc<Vault<InMemoryFederation, MockChain, MockChain>>;

struct Harness {
    vault: TestVault,
    chain: Arc<MockChain>,
    transport: Arc<InMemoryFederation>,
    key: SigningKey,
    sender: String,
    _dir: tempfile::TempDir,
}

fn config_with_shards(shards: &str) -> NodeConfig {
    // The data dir is filled in by the harness with a fresh tempdir.
    toml::from_str(&format!(
        r#"
        node_id = "vault-under-test"
        node_url = "http://127.0.0.1:3004"
        node_shards = "{shards}"
        replication_timeout_ms = 200

        [gc]
        retention_mode = "hybrid"
        max_blob_age_days = 30
        min_free_disk_mb = 0
        reserved_for_pinned_mb = 0
        verify_replicas = false
        "#
    ))
    .unwrap()
}

fn harness_with(config: NodeConfig, peers: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config;
    config.data_dir = dir.path().to_path_buf();

    let chain = Arc::new(MockChain::new());
    let transport = Arc::new(InMemoryFederation::new());
    let vault = Vault::open(
        config,
        chain.clone(),
        chain.clone(),
        transport.clone(),
        VaultOptions {
            acceptance_window: Some(Duration::from_millis(500)),
        },
    )
    .unwrap();
    vault.set_peers(peers.iter().map(|p| test_peer(p)).collect());

    let key = SigningKey::from_slice(&[0x21u8; 32]).unwrap();
    let sender = eth_address_of_pubkey(key.verifying_key());
    chain.authorize_app("hashd", sender.clone());

    Harness {
        vault,
        chain,
        transport,
        key,
        sender,
        _dir: dir,
    }
}

fn harness(peers: &[&str]) -> Harness {
    harness_with(config_with_shards("0-1023"), peers)
}

fn sign_personal(key: &SigningKey, message: &str) -> String {
    let prefixed = format!(
        "\u{19}Ethereum Signed Message:\n{}{}",
        message.len(),
        message
    );
    let digest = keccak256(prefixed.as_bytes());
    let (sig, recid): (Signature, RecoveryId) = key.sign_prehash(&digest).unwrap();
    let mut raw = sig.to_bytes().to_vec();
    raw.push(recid.to_byte() + 27);
    format!("0x{}", hex::encode(raw))
}

fn signed_message_auth(h: &Harness, ciphertext: &[u8], nonce: &str) -> AuthorizationRecord {
    let other = "0x00000000000000000000000000000000000000aa".to_string();
    let participants = vec![h.sender.clone(), other];
    let thread_id = thread_id_for(&participants);
    let mut record = AuthorizationRecord {
        kind: AuthKind::Message,
        sender: h.sender.clone(),
        signature: String::new(),
        timestamp: now_millis(),
        nonce: nonce.to_string(),
        content_hash: cid_of(ciphertext).to_hex(),
        app_id: "hashd".into(),
        content_type: "message".into(),
        group_posts_address: None,
        thread_id: Some(thread_id),
        participants: Some(participants),
        token_address: None,
    };
    record.signature = sign_personal(&h.key, &build_auth_message(&record));
    record
}

fn store_request(h: &Harness, ciphertext: &[u8], nonce: &str) -> StoreRequest {
    StoreRequest {
        ciphertext: ciphertext.to_vec(),
        mime_type: "application/octet-stream".into(),
        authorization: signed_message_auth(h, ciphertext, nonce),
    }
}

#[tokio::test]
async fn happy_write_replicates_to_three_peers() {
    let h = harness(&["p1", "p2", "p3"]);
    let receipt = h
        .vault
        .store(store_request(&h, b"hello", "n-1"))
        .await
        .unwrap();

    assert!(receipt.success);
    assert_eq!(
        receipt.cid.to_hex(),
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(receipt.replication_status.target, 3);
    assert_eq!(receipt.replication_status.confirmed, 3);
    assert!(receipt.replication_status.complete);

    // The blob landed locally and on every confirmed peer.
    assert!(h.vault.contains(&receipt.cid).await);
    for peer in ["p1", "p2", "p3"] {
        assert!(h.transport.holds(peer, &receipt.cid));
    }

    // Confirmations were mirrored into the metadata.
    let md = h.vault.blob_store().get_metadata(&receipt.cid).unwrap();
    assert_eq!(md.replication.replicated_to.len(), 3);
}

#[tokio::test]
async fn write_outside_owned_shards_is_rejected() {
    let h = harness_with(config_with_shards("0-255"), &[]);

    // Find a payload whose CID lands outside the owned range.
    let mut payload = Vec::new();
    for i in 0u32.. {
        let bytes = format!("shard probe {i}").into_bytes();
        if cid_of(&bytes).shard_key(1024) > 255 {
            payload = bytes;
            break;
        }
    }
    let err = h
        .vault
        .store(store_request(&h, &payload, "n-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::ShardMismatch { shard } if shard > 255));
    assert_eq!(err.http_status(), 403);
    assert!(!h.vault.contains(&cid_of(&payload)).await);
}

#[tokio::test]
async fn replayed_request_is_forbidden_with_nonce_reason() {
    let h = harness(&[]);
    let request = store_request(&h, b"replay me", "n-replay");
    h.vault.store(request.clone_for_test()).await.unwrap();

    let err = h.vault.store(request).await.unwrap_err();
    assert_eq!(err.http_status(), 403);
    assert_eq!(err.code(), "FORBIDDEN");
    assert_eq!(err.sub_reason(), Some("nonce_replay"));
}

// StoreRequest has no Clone in the public contract; tests rebuild it.
trait CloneForTest {
    fn clone_for_test(&self) -> StoreRequest;
}

impl CloneForTest for StoreRequest {
    fn clone_for_test(&self) -> StoreRequest {
        StoreRequest {
            ciphertext: self.ciphertext.clone(),
            mime_type: self.mime_type.clone(),
            authorization: self.authorization.clone(),
        }
    }
}

#[tokio::test]
async fn pinned_blob_survives_gc() {
    let h = harness(&["p1", "p2", "p3"]);
    let receipt = h
        .vault
        .store(store_request(&h, b"precious bytes", "n-pin"))
        .await
        .unwrap();
    h.vault.pin(&receipt.cid).await.unwrap();

    // Age the blob well past the retention window.
    h.vault
        .blob_store()
        .update_metadata(&receipt.cid, |md| {
            md.created_at -= 40 * 86_400_000;
        })
        .unwrap();

    let report = h.vault.run_gc(false).await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.skipped_pinned, 1);
    assert!(h.vault.contains(&receipt.cid).await);

    // Unpinned, the same blob is reclaimed on the next run.
    h.vault.unpin(&receipt.cid).await.unwrap();
    let report = h.vault.run_gc(false).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!h.vault.contains(&receipt.cid).await);
}

#[tokio::test]
async fn consensus_read_outvotes_a_liar() {
    let h = harness(&["p1", "p2", "p3"]);
    let honest = b"the real ciphertext".to_vec();
    let cid = cid_of(&honest);
    h.transport.seed("p1", cid, honest.clone());
    h.transport.seed("p2", cid, honest.clone());
    h.transport.seed("p3", cid, honest.clone());
    h.transport
        .set_behavior("p3", PeerBehavior::Lying(b"forged".to_vec()));

    let replicas = vec![test_peer("p1"), test_peer("p2"), test_peer("p3")];
    let result = h
        .vault
        .consensus()
        .fetch_with_consensus(&cid, &replicas)
        .await
        .unwrap();
    assert!(result.consensus);
    assert_eq!(result.matching_replicas, 2);
    assert_eq!(result.accepted_hash, cid.to_hex());
    assert_eq!(result.disputed_nodes, vec!["p3".to_string()]);
    assert_eq!(h.vault.audit().disputes().len(), 1);
}

#[tokio::test]
async fn read_falls_back_to_peers_past_censors() {
    let h = harness(&["bad1", "bad2", "bad3", "good1", "good2"]);
    let bytes = b"worth fetching".to_vec();
    let cid = cid_of(&bytes);
    for p in ["bad1", "bad2", "bad3"] {
        h.transport.set_behavior(p, PeerBehavior::Refusing);
    }
    h.transport.seed("good1", cid, bytes.clone());
    h.transport.seed("good2", cid, bytes.clone());

    // Nothing local: the read hedges across the federation.
    let blob = h.vault.fetch(&cid).await.unwrap();
    assert!(!blob.local);
    assert_eq!(blob.bytes, bytes);

    // Refusals that were sampled are on the audit log and penalized.
    for event in h.vault.audit().censorship_events() {
        assert!(event.node_id.starts_with("bad"));
        let obs = h.vault.registry().observation(&event.node_id).unwrap();
        assert!(obs.failure_count >= 1);
    }
}

#[tokio::test]
async fn missing_blob_with_no_holders_is_not_found() {
    let h = harness(&["p1", "p2"]);
    let cid = cid_of(b"never stored anywhere");
    let err = h.vault.fetch(&cid).await.unwrap_err();
    assert_eq!(err.code(), "BLOB_NOT_FOUND");
}

#[tokio::test]
async fn single_peer_write_reports_incomplete_replication() {
    let h = harness(&["only-peer"]);
    let receipt = h
        .vault
        .store(store_request(&h, b"under-replicated", "n-1"))
        .await
        .unwrap();
    assert!(receipt.success);
    assert_eq!(receipt.replication_status.target, 3);
    assert_eq!(receipt.replication_status.confirmed, 1);
    assert!(!receipt.replication_status.complete);
}

#[tokio::test]
async fn blocked_cid_is_rejected_after_authorization() {
    let mut config = config_with_shards("0-1023");
    let blocked = cid_of(b"contraband");
    config.blocked_cids = vec![blocked.to_hex()];
    let h = harness_with(config, &[]);

    let err = h
        .vault
        .store(store_request(&h, b"contraband", "n-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONTENT_BLOCKED");
    assert_eq!(err.http_status(), 403);
}

#[tokio::test]
async fn blocklist_swap_applies_to_the_next_request() {
    let h = harness(&[]);
    let bytes = b"fine today, blocked tomorrow";
    h.vault.store(store_request(&h, bytes, "n-1")).await.unwrap();

    // An operator pushes a new snapshot; the same content is now refused.
    let other = b"second copy attempt";
    h.vault
        .replace_blocked_cids(vec![cid_of(other).to_hex()]);
    let err = h
        .vault
        .store(store_request(&h, other, "n-2"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CONTENT_BLOCKED");
}

#[tokio::test]
async fn shard_report_counts_peer_coverage() {
    let h = harness(&[]);
    let mut half = test_peer("half-owner");
    half.shards = Some("0-511".into());
    h.vault.set_peers(vec![half]);

    let report = h.vault.shard_report().await;
    assert_eq!(report.shard_count, 1024);
    assert_eq!(report.owned_shards, 1024);
    // This node covers everything, the peer covers half.
    assert!((report.avg_nodes_per_shard - 1.5).abs() < 1e-9);
}

#[tokio::test]
async fn health_probe_feeds_observations() {
    let h = harness(&["alive", "dead"]);
    h.transport
        .set_behavior("dead", PeerBehavior::Refusing);

    h.vault.probe_peer_health().await;
    let alive = h.vault.registry().observation("alive").unwrap();
    assert_eq!(alive.success_count, 1);
    let dead = h.vault.registry().observation("dead").unwrap();
    assert_eq!(dead.failure_count, 1);
}

#[tokio::test]
async fn replication_intake_round_trips_through_the_vault() {
    use bytecave_api::transport::ReplicaMeta;
    use bytecave_crypto::node_id_of_public_key;
    use bytecave_replication::IncomingReplica;
    use bytecave_types::peer::PeerRecord;

    let h = harness(&[]);
    let bytes = b"pushed by a peer".to_vec();
    let cid = cid_of(&bytes);
    h.chain.add_post_cid(cid);
    let public_key = "04feedface";
    h.chain.add_node(
        node_id_of_public_key(public_key),
        PeerRecord {
            node_id: node_id_of_public_key(public_key),
            endpoint: "http://peer-9:3004".into(),
            public_key: public_key.into(),
            active: true,
            shards: None,
        },
    );

    let ack = h
        .vault
        .replicate_in(IncomingReplica {
            cid,
            bytes: bytes.clone(),
            mime_type: "application/octet-stream".into(),
            meta: ReplicaMeta::default(),
            peer_public_key: public_key.into(),
        })
        .await
        .unwrap();
    assert!(ack.stored);
    assert!(h.vault.contains(&cid).await);

    // Identical push: acknowledged as already stored, nothing mutated.
    let ack = h
        .vault
        .replicate_in(IncomingReplica {
            cid,
            bytes,
            mime_type: "application/octet-stream".into(),
            meta: ReplicaMeta::default(),
            peer_public_key: public_key.into(),
        })
        .await
        .unwrap();
    assert!(ack.already_stored);
}

#[test]
fn shard_distribution_is_uniform_enough() {
    use bytecave_types::shard::distribution_of;
    use rand::{Rng, SeedableRng};

    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let cids: Vec<Cid> = (0..1000)
        .map(|_| {
            let payload: [u8; 16] = rng.gen();
            cid_of(&payload)
        })
        .collect();

    let shard_count = 256u32;
    let dist = distribution_of(cids.iter(), shard_count);
    let n = cids.len() as u64;
    assert!(dist.covered_shards >= (0.8 * (n.min(shard_count as u64) as f64)) as u64);
    assert!(dist.max_shard_count <= 3 * (n / shard_count as u64));

    // Shard keys are deterministic and in range.
    for cid in &cids {
        let key = cid.shard_key(shard_count);
        assert_eq!(key, cid.shard_key(shard_count));
        assert!(key < shard_count);
    }
}
