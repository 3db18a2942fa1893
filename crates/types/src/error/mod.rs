// Path: crates/types/src/error/mod.rs
//! Error taxonomy for the vault node.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Failure to parse a content identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidParseError {
    /// The string was not 64 characters long.
    #[error("CID must be 64 hex characters, got {0}")]
    Length(usize),
    /// The string contained uppercase hex digits.
    #[error("CID must be lowercase hex")]
    NotLowercase,
    /// The string contained non-hex characters.
    #[error("CID must be hex")]
    NotHex,
}

/// Errors from the on-disk blob store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested blob is not stored locally.
    #[error("Blob not found: {0}")]
    BlobNotFound(String),
    /// Admitting the blob would exceed the configured capacity.
    #[error("Storage full: {needed} bytes needed, {available} available")]
    StorageFull { needed: u64, available: u64 },
    /// The blob exceeds the per-blob size limit.
    #[error("Payload too large: {size} bytes, limit {max}")]
    PayloadTooLarge { size: u64, max: u64 },
    /// The stored bytes no longer hash to the CID.
    #[error("Stored ciphertext does not match CID {0}")]
    Corrupt(String),
    /// An I/O error from the underlying filesystem.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// A metadata record failed to encode or decode.
    #[error("Metadata codec error: {0}")]
    Codec(String),
}

impl ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::BlobNotFound(_) => "BLOB_NOT_FOUND",
            Self::StorageFull { .. } => "STORAGE_FULL",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::Corrupt(_) => "BLOB_CORRUPT",
            Self::Io(_) => "STORAGE_IO_ERROR",
            Self::Codec(_) => "STORAGE_CODEC_ERROR",
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Codec(e.to_string())
    }
}

/// Rejections from the authorization oracle. Codes are the machine-readable
/// sub-reasons surfaced to clients; they never leak secret material.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required field was absent from the authorization record.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    /// The app id is not on this node's allowlist.
    #[error("App '{0}' is not allowed on this node")]
    AppNotAllowed(String),
    /// The `(appId, sender)` pair is not authorized in the app registry.
    #[error("App registry rejected app '{app_id}' for sender {sender}")]
    AppNotAuthorized { app_id: String, sender: String },
    /// The registry is required by policy but could not be reached.
    #[error("App registry unavailable")]
    RegistryUnavailable,
    /// The record's timestamp is outside the acceptance window.
    #[error("Timestamp outside the ±{window_secs}s window (skew {skew_ms}ms)")]
    TimestampSkew { skew_ms: i64, window_secs: i64 },
    /// The declared content hash does not match the ciphertext.
    #[error("Content hash does not match ciphertext")]
    ContentHashMismatch,
    /// The `(sender, nonce)` pair was already used within the replay window.
    #[error("Nonce already used by sender")]
    NonceReplay,
    /// The recovered signer differs from the claimed sender.
    #[error("Recovered signer does not match sender")]
    SignatureMismatch,
    /// The signature bytes could not be processed at all.
    #[error("Signature recovery failed: {0}")]
    SignatureInvalid(String),
    /// The sender is not a member of the group token.
    #[error("Sender is not a member of the group")]
    NotMember,
    /// The provided thread id does not match the participant set.
    #[error("Thread id does not match participants")]
    ThreadIdMismatch,
    /// The sender does not appear in the message participants.
    #[error("Sender is not a thread participant")]
    SenderNotParticipant,
    /// Fewer than two participants were supplied for a message.
    #[error("A message thread requires at least two participants")]
    TooFewParticipants,
    /// The sender does not own the token being distributed.
    #[error("Sender does not own the distribution token")]
    NotTokenOwner,
    /// The chain could not be consulted within the deadline.
    #[error("Chain lookup failed: {0}")]
    ChainUnavailable(String),
    /// The CID is not referenced by any authorized on-chain record.
    #[error("CID is not authorized on chain")]
    CidNotOnChain,
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::AppNotAllowed(_) => "app_not_allowed",
            Self::AppNotAuthorized { .. } => "app_not_authorized",
            Self::RegistryUnavailable => "registry_unavailable",
            Self::TimestampSkew { .. } => "timestamp_skew",
            Self::ContentHashMismatch => "content_hash_mismatch",
            Self::NonceReplay => "nonce_replay",
            Self::SignatureMismatch => "signature_mismatch",
            Self::SignatureInvalid(_) => "signature_invalid",
            Self::NotMember => "not_member",
            Self::ThreadIdMismatch => "threadId_mismatch",
            Self::SenderNotParticipant => "sender_not_participant",
            Self::TooFewParticipants => "too_few_participants",
            Self::NotTokenOwner => "not_token_owner",
            Self::ChainUnavailable(_) => "chain_unavailable",
            Self::CidNotOnChain => "cid_not_on_chain",
        }
    }
}

/// Errors from the external chain client.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The RPC did not answer within the deadline.
    #[error("Chain RPC timed out")]
    Timeout,
    /// The RPC answered with an error.
    #[error("Chain RPC error: {0}")]
    Rpc(String),
    /// The queried record does not exist.
    #[error("Not found on chain: {0}")]
    NotFound(String),
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::Timeout => "CHAIN_TIMEOUT",
            Self::Rpc(_) => "CHAIN_RPC_ERROR",
            Self::NotFound(_) => "CHAIN_NOT_FOUND",
        }
    }
}

/// Errors from cryptographic primitives.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The key material is malformed.
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    /// The signature bytes are malformed.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// Public-key recovery failed.
    #[error("Recovery failed: {0}")]
    RecoveryFailed(String),
    /// Reading or creating the node secret failed.
    #[error("Key file error: {0}")]
    KeyFile(#[from] std::io::Error),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "CRYPTO_INVALID_KEY",
            Self::InvalidSignature(_) => "CRYPTO_INVALID_SIGNATURE",
            Self::RecoveryFailed(_) => "CRYPTO_RECOVERY_FAILED",
            Self::KeyFile(_) => "CRYPTO_KEY_FILE_ERROR",
        }
    }
}

/// Errors from the replication engine, including the intake side.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// No peer passed the selection filters.
    #[error("No eligible replication targets")]
    NoEligiblePeers,
    /// The sending peer is on the local blocklist.
    #[error("Peer {0} is blocked")]
    PeerBlocked(String),
    /// The sending peer is not registered and active on chain.
    #[error("Peer {0} is not a registered active node")]
    PeerNotRegistered(String),
    /// The CID is on the local blocklist.
    #[error("Content blocked: {0}")]
    CidBlocked(String),
    /// The pushed bytes do not hash to the claimed CID.
    #[error("Ciphertext does not hash to claimed CID {0}")]
    CidMismatch(String),
    /// The CID is not backed by an authorized on-chain record.
    #[error("CID {0} is not authorized on chain")]
    NotAuthorizedOnChain(String),
    /// Media intake without a sender attribution.
    #[error("Media replication requires a sender")]
    MissingSender,
    /// Local storage rejected the blob.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    /// Chain lookup failed while validating the intake.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

impl ErrorCode for ReplicationError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoEligiblePeers => "REPLICATION_NO_TARGETS",
            Self::PeerBlocked(_) => "FORBIDDEN",
            Self::PeerNotRegistered(_) => "FORBIDDEN",
            Self::CidBlocked(_) => "CONTENT_BLOCKED",
            Self::CidMismatch(_) => "CID_MISMATCH",
            Self::NotAuthorizedOnChain(_) => "UNAUTHORIZED",
            Self::MissingSender => "INVALID_REQUEST",
            Self::Storage(e) => e.code(),
            Self::Chain(e) => e.code(),
        }
    }
}

/// Errors from the read-path consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// No hash reached quorum across the replica responses.
    #[error("No consensus across {responses} responses ({distinct} distinct hashes)")]
    NoQuorum { responses: usize, distinct: usize },
    /// Every dialed replica failed or timed out.
    #[error("All {0} replicas failed")]
    AllReplicasFailed(usize),
    /// There were no replicas to dial at all.
    #[error("No replicas available")]
    NoReplicas,
}

impl ErrorCode for ConsensusError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoQuorum { .. } => "CONSENSUS_FAILED",
            Self::AllReplicasFailed(_) => "CONSENSUS_FAILED",
            Self::NoReplicas => "CONSENSUS_FAILED",
        }
    }
}

/// Errors from the garbage collector.
#[derive(Debug, Error)]
pub enum GcError {
    /// A run was requested while another was in flight.
    #[error("GC already running")]
    AlreadyRunning,
    /// The store failed during a scan or deletion.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ErrorCode for GcError {
    fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "GC_ALREADY_RUNNING",
            Self::Storage(e) => e.code(),
        }
    }
}

/// Errors raised while loading or validating the node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    /// The shard specification could not be parsed.
    #[error("Invalid shard spec: {0}")]
    InvalidShardSpec(String),
    /// A development or test node points at a production-looking data dir.
    #[error("Refusing to run a {node_env} node against data dir '{data_dir}'")]
    UnsafeDataDir { node_env: String, data_dir: String },
    /// A setting has an out-of-range or inconsistent value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "CONFIG_MISSING",
            Self::InvalidShardSpec(_) => "CONFIG_INVALID_SHARDS",
            Self::UnsafeDataDir { .. } => "CONFIG_UNSAFE_DATA_DIR",
            Self::Invalid(_) => "CONFIG_INVALID",
        }
    }
}

/// The top-level error surfaced by the write pipeline and the HTTP layer.
/// Variants mirror the federation's wire taxonomy one-to-one.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid authorization: {0}")]
    InvalidAuthorization(AuthError),
    #[error("Unauthorized: {0}")]
    Unauthorized(AuthError),
    #[error("Forbidden: {reason}")]
    Forbidden {
        reason: String,
        /// Machine-readable sub-reason, e.g. `nonce_replay`.
        sub: Option<&'static str>,
    },
    #[error("Blob not found: {0}")]
    BlobNotFound(String),
    #[error("CID mismatch")]
    CidMismatch,
    #[error("Payload too large: {size} bytes, limit {max}")]
    PayloadTooLarge { size: u64, max: u64 },
    #[error("Storage full")]
    StorageFull,
    #[error("Content blocked")]
    ContentBlocked,
    #[error("CID belongs to shard {shard}, which this node does not own")]
    ShardMismatch { shard: u32 },
    #[error("GC already running")]
    GcAlreadyRunning,
    #[error("Consensus failed: {0}")]
    ConsensusFailed(ConsensusError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ErrorCode for VaultError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidAuthorization(_) => "INVALID_AUTHORIZATION",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::BlobNotFound(_) => "BLOB_NOT_FOUND",
            Self::CidMismatch => "CID_MISMATCH",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::StorageFull => "STORAGE_FULL",
            Self::ContentBlocked => "CONTENT_BLOCKED",
            Self::ShardMismatch { .. } => "SHARD_MISMATCH",
            Self::GcAlreadyRunning => "GC_ALREADY_RUNNING",
            Self::ConsensusFailed(_) => "CONSENSUS_FAILED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl VaultError {
    /// The suggested HTTP status for this error kind.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::InvalidAuthorization(_) | Self::CidMismatch => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden { .. } | Self::ContentBlocked | Self::ShardMismatch { .. } => 403,
            Self::BlobNotFound(_) => 404,
            Self::GcAlreadyRunning => 409,
            Self::PayloadTooLarge { .. } => 413,
            Self::ConsensusFailed(_) => 502,
            Self::StorageFull => 507,
            Self::Internal(_) => 500,
        }
    }

    /// The machine-readable sub-reason, where one exists.
    pub fn sub_reason(&self) -> Option<&'static str> {
        match self {
            Self::InvalidAuthorization(e) | Self::Unauthorized(e) => Some(e.code()),
            Self::Forbidden { sub, .. } => *sub,
            _ => None,
        }
    }
}

impl From<AuthError> for VaultError {
    /// Routes oracle rejections onto the wire taxonomy: replays are
    /// forbidden, malformed records are invalid, verification failures are
    /// unauthorized.
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NonceReplay => VaultError::Forbidden {
                reason: e.to_string(),
                sub: Some(e.code()),
            },
            AuthError::MissingField(_)
            | AuthError::SignatureInvalid(_)
            | AuthError::TooFewParticipants => VaultError::InvalidAuthorization(e),
            other => VaultError::Unauthorized(other),
        }
    }
}

impl From<StorageError> for VaultError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::BlobNotFound(cid) => VaultError::BlobNotFound(cid),
            StorageError::StorageFull { .. } => VaultError::StorageFull,
            StorageError::PayloadTooLarge { size, max } => {
                VaultError::PayloadTooLarge { size, max }
            }
            other => VaultError::Internal(other.to_string()),
        }
    }
}

impl From<GcError> for VaultError {
    fn from(e: GcError) -> Self {
        match e {
            GcError::AlreadyRunning => VaultError::GcAlreadyRunning,
            GcError::Storage(s) => s.into(),
        }
    }
}

impl From<ConsensusError> for VaultError {
    fn from(e: ConsensusError) -> Self {
        VaultError::ConsensusFailed(e)
    }
}

impl From<ReplicationError> for VaultError {
    /// Maps intake rejections onto the wire taxonomy.
    fn from(e: ReplicationError) -> Self {
        let reason = e.to_string();
        match e {
            ReplicationError::PeerBlocked(_) | ReplicationError::PeerNotRegistered(_) => {
                VaultError::Forbidden { reason, sub: None }
            }
            ReplicationError::CidBlocked(_) => VaultError::ContentBlocked,
            ReplicationError::CidMismatch(_) => VaultError::CidMismatch,
            ReplicationError::NotAuthorizedOnChain(_) => {
                VaultError::Unauthorized(AuthError::CidNotOnChain)
            }
            ReplicationError::MissingSender => VaultError::InvalidRequest(reason),
            ReplicationError::Storage(s) => s.into(),
            ReplicationError::Chain(_) | ReplicationError::NoEligiblePeers => {
                VaultError::Internal(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_matches_taxonomy() {
        assert_eq!(VaultError::StorageFull.http_status(), 507);
        assert_eq!(VaultError::ShardMismatch { shard: 9 }.http_status(), 403);
        assert_eq!(VaultError::GcAlreadyRunning.http_status(), 409);
        assert_eq!(
            VaultError::ConsensusFailed(ConsensusError::NoReplicas).http_status(),
            502
        );
        assert_eq!(VaultError::CidMismatch.code(), "CID_MISMATCH");
    }

    #[test]
    fn auth_sub_reasons_are_stable() {
        assert_eq!(AuthError::NonceReplay.code(), "nonce_replay");
        assert_eq!(AuthError::SignatureMismatch.code(), "signature_mismatch");
        assert_eq!(AuthError::ThreadIdMismatch.code(), "threadId_mismatch");
        let err: VaultError = AuthError::NonceReplay.into();
        assert_eq!(err.sub_reason(), Some("nonce_replay"));
        // Replays are forbidden, not merely unauthorized.
        assert_eq!(err.http_status(), 403);
        assert_eq!(err.code(), "FORBIDDEN");

        let err: VaultError = AuthError::SignatureMismatch.into();
        assert_eq!(err.http_status(), 401);
        let err: VaultError = AuthError::MissingField("appId").into();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn storage_errors_map_onto_wire_taxonomy() {
        let full: VaultError = StorageError::StorageFull {
            needed: 10,
            available: 5,
        }
        .into();
        assert_eq!(full.code(), "STORAGE_FULL");
        let missing: VaultError = StorageError::BlobNotFound("ab".into()).into();
        assert_eq!(missing.http_status(), 404);
    }
}
