// Path: crates/auth/src/oracle.rs

//! The authorization pipeline. Order matters: cheap local checks run before
//! chain round trips, and the nonce is recorded only after everything passed.

use crate::nonce::NonceCache;
use bytecave_api::chain::{AppRegistry, ChainClient};
use bytecave_crypto::{build_auth_message, cid_of, recover_personal_sign, thread_id_for};
use bytecave_types::auth::{AuthKind, AuthOutcome, AuthorizationRecord};
use bytecave_types::config::AuthConfig;
use bytecave_types::error::{AuthError, ErrorCode};
use bytecave_types::UnixMillis;
use std::sync::Arc;

/// Accept timestamps within ±5 minutes.
const MAX_SKEW_MS: i64 = 5 * 60 * 1000;

/// Decides whether a write is permitted, given an authorization record and
/// the candidate ciphertext.
pub struct AuthorizationOracle<R, C> {
    registry: Arc<R>,
    chain: Arc<C>,
    nonces: NonceCache,
    policy: AuthConfig,
}

impl<R: AppRegistry, C: ChainClient> AuthorizationOracle<R, C> {
    pub fn new(registry: Arc<R>, chain: Arc<C>, policy: AuthConfig) -> Self {
        AuthorizationOracle {
            registry,
            chain,
            nonces: NonceCache::new(),
            policy,
        }
    }

    /// The replay cache, exposed so the composition root can schedule sweeps.
    pub fn nonces(&self) -> &NonceCache {
        &self.nonces
    }

    /// Runs the full pipeline. On success the nonce is burned and the
    /// outcome names the verified sender.
    pub async fn authorize(
        &self,
        record: &AuthorizationRecord,
        ciphertext: &[u8],
        now: UnixMillis,
    ) -> Result<AuthOutcome, AuthError> {
        let result = self.verify(record, ciphertext, now).await;
        match &result {
            Ok(_) => {
                // Burned last, so a failed authorization never costs the
                // client its nonce.
                self.nonces.record(&record.sender, &record.nonce, now);
                tracing::debug!(
                    target: "auth",
                    event = "write_authorized",
                    kind = record.kind.as_str(),
                    sender = %record.sender,
                    app_id = %record.app_id,
                );
            }
            Err(e) => {
                tracing::info!(
                    target: "auth",
                    event = "write_rejected",
                    kind = record.kind.as_str(),
                    sender = %record.sender,
                    reason = e.code(),
                );
            }
        }
        result
    }

    async fn verify(
        &self,
        record: &AuthorizationRecord,
        ciphertext: &[u8],
        now: UnixMillis,
    ) -> Result<AuthOutcome, AuthError> {
        // 1. Required fields.
        self.check_required_fields(record)?;

        // 2. App allowlist and registry.
        self.check_app_policy(record).await?;

        // 3. Freshness: accept at exactly the window edge, reject past it.
        let skew = (now - record.timestamp).abs();
        if skew > MAX_SKEW_MS {
            return Err(AuthError::TimestampSkew {
                skew_ms: skew,
                window_secs: MAX_SKEW_MS / 1000,
            });
        }

        // 4. Content binding.
        let computed = cid_of(ciphertext).to_hex();
        if record.content_hash.to_ascii_lowercase() != computed {
            return Err(AuthError::ContentHashMismatch);
        }

        // 5. Replay.
        if self.nonces.is_used(&record.sender, &record.nonce, now) {
            return Err(AuthError::NonceReplay);
        }

        // 6. Signature: the recovered signer must be the claimed sender.
        let message = build_auth_message(record);
        let recovered = recover_personal_sign(&message, &record.signature)
            .map_err(|e| AuthError::SignatureInvalid(e.to_string()))?;
        if !recovered.eq_ignore_ascii_case(&record.sender) {
            return Err(AuthError::SignatureMismatch);
        }

        // 7. On-chain authorization by type.
        match record.kind {
            AuthKind::GroupPost | AuthKind::GroupComment => {
                self.check_group_membership(record).await?
            }
            AuthKind::Message => self.check_thread(record)?,
            AuthKind::TokenDistribution => self.check_token_ownership(record).await?,
        }

        Ok(AuthOutcome::granted(recovered))
    }

    fn check_required_fields(&self, record: &AuthorizationRecord) -> Result<(), AuthError> {
        if record.app_id.trim().is_empty() {
            return Err(AuthError::MissingField("appId"));
        }
        if record.content_type.trim().is_empty() {
            return Err(AuthError::MissingField("contentType"));
        }
        match record.kind {
            AuthKind::GroupPost | AuthKind::GroupComment => {
                if record
                    .group_posts_address
                    .as_deref()
                    .unwrap_or("")
                    .is_empty()
                {
                    return Err(AuthError::MissingField("groupPostsAddress"));
                }
            }
            AuthKind::Message => {
                if record.thread_id.as_deref().unwrap_or("").is_empty() {
                    return Err(AuthError::MissingField("threadId"));
                }
                if record.participants.as_deref().unwrap_or(&[]).is_empty() {
                    return Err(AuthError::MissingField("participants"));
                }
            }
            AuthKind::TokenDistribution => {
                if record.token_address.as_deref().unwrap_or("").is_empty() {
                    return Err(AuthError::MissingField("tokenAddress"));
                }
            }
        }
        Ok(())
    }

    async fn check_app_policy(&self, record: &AuthorizationRecord) -> Result<(), AuthError> {
        if let Some(allowed) = &self.policy.allowed_apps {
            let hit = allowed
                .iter()
                .any(|pat| pat == "*" || record.app_id.contains(pat.as_str()));
            if !hit {
                return Err(AuthError::AppNotAllowed(record.app_id.clone()));
            }
        }

        if !self.registry.available().await {
            if self.policy.require_app_registry {
                return Err(AuthError::RegistryUnavailable);
            }
            tracing::warn!(
                target: "auth",
                event = "registry_unavailable",
                app_id = %record.app_id,
                "App registry unreachable, proceeding without it"
            );
            return Ok(());
        }

        let authorized = self
            .registry
            .is_app_authorized(&record.app_id, &record.sender)
            .await
            .map_err(|e| {
                if self.policy.require_app_registry {
                    AuthError::RegistryUnavailable
                } else {
                    AuthError::ChainUnavailable(e.to_string())
                }
            })?;
        if !authorized {
            return Err(AuthError::AppNotAuthorized {
                app_id: record.app_id.clone(),
                sender: record.sender.clone(),
            });
        }
        Ok(())
    }

    async fn check_group_membership(&self, record: &AuthorizationRecord) -> Result<(), AuthError> {
        let address = record.group_posts_address.as_deref().unwrap_or("");
        let token = self
            .chain
            .get_group_token(address)
            .await
            .map_err(|e| AuthError::ChainUnavailable(e.to_string()))?
            .ok_or(AuthError::NotMember)?;
        let member = self
            .chain
            .is_member(&record.sender, &token)
            .await
            .map_err(|e| AuthError::ChainUnavailable(e.to_string()))?;
        if !member {
            return Err(AuthError::NotMember);
        }
        Ok(())
    }

    fn check_thread(&self, record: &AuthorizationRecord) -> Result<(), AuthError> {
        let participants = record.participants.as_deref().unwrap_or(&[]);
        if participants.len() < 2 {
            return Err(AuthError::TooFewParticipants);
        }
        if !self.policy.allow_nonparticipant_sender {
            let sender_present = participants
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&record.sender));
            if !sender_present {
                return Err(AuthError::SenderNotParticipant);
            }
        }
        let expected = thread_id_for(participants);
        let provided = record.thread_id.as_deref().unwrap_or("");
        if !expected.eq_ignore_ascii_case(provided) {
            return Err(AuthError::ThreadIdMismatch);
        }
        Ok(())
    }

    async fn check_token_ownership(&self, record: &AuthorizationRecord) -> Result<(), AuthError> {
        let token_address = record.token_address.as_deref().unwrap_or("");
        let group = self
            .chain
            .get_group_by_token(token_address)
            .await
            .map_err(|e| AuthError::ChainUnavailable(e.to_string()))?
            .ok_or(AuthError::NotTokenOwner)?;
        if !group.owner.eq_ignore_ascii_case(&record.sender) {
            return Err(AuthError::NotTokenOwner);
        }
        Ok(())
    }
}
