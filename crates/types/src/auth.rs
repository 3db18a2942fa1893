// Path: crates/types/src/auth.rs

//! Write-side authorization records. These are validated, never persisted.

use serde::{Deserialize, Serialize};

/// The kind of on-chain record authorizing a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    GroupPost,
    GroupComment,
    Message,
    TokenDistribution,
}

impl AuthKind {
    /// The wire name used inside the signed message template.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::GroupPost => "group_post",
            AuthKind::GroupComment => "group_comment",
            AuthKind::Message => "message",
            AuthKind::TokenDistribution => "token_distribution",
        }
    }
}

/// An authorization submitted alongside a write.
///
/// Context fields are type-specific: posts and comments carry
/// `group_posts_address`, messages carry `thread_id` + `participants`, token
/// distributions carry `token_address`. Presence is validated as the first
/// step of the oracle pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRecord {
    #[serde(rename = "type")]
    pub kind: AuthKind,
    /// The claimed signer, a 0x-prefixed EVM address.
    pub sender: String,
    /// EIP-191 personal-sign signature over the canonical message.
    pub signature: String,
    /// Unix milliseconds at signing time.
    pub timestamp: i64,
    /// Per-sender opaque replay token.
    pub nonce: String,
    /// Lowercase hex SHA-256 of the ciphertext.
    pub content_hash: String,
    pub app_id: String,
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_posts_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
}

impl AuthorizationRecord {
    /// The context string bound into the signed message: the group posts
    /// address, the thread id, the token address, or empty.
    pub fn context_string(&self) -> &str {
        match self.kind {
            AuthKind::GroupPost | AuthKind::GroupComment => {
                self.group_posts_address.as_deref().unwrap_or("")
            }
            AuthKind::Message => self.thread_id.as_deref().unwrap_or(""),
            AuthKind::TokenDistribution => self.token_address.as_deref().unwrap_or(""),
        }
    }
}

/// The oracle's verdict on one write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOutcome {
    pub authorized: bool,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuthOutcome {
    pub fn granted(sender: impl Into<String>) -> Self {
        AuthOutcome {
            authorized: true,
            sender: sender.into(),
            error: None,
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_wire_names() {
        assert_eq!(AuthKind::GroupPost.as_str(), "group_post");
        assert_eq!(AuthKind::TokenDistribution.as_str(), "token_distribution");
        let k: AuthKind = serde_json::from_str("\"group_comment\"").unwrap();
        assert_eq!(k, AuthKind::GroupComment);
    }

    #[test]
    fn context_string_follows_kind() {
        let mut rec = AuthorizationRecord {
            kind: AuthKind::Message,
            sender: "0xabc".into(),
            signature: String::new(),
            timestamp: 0,
            nonce: "n".into(),
            content_hash: String::new(),
            app_id: "app".into(),
            content_type: "message".into(),
            group_posts_address: Some("0xgroup".into()),
            thread_id: Some("0xthread".into()),
            participants: None,
            token_address: None,
        };
        assert_eq!(rec.context_string(), "0xthread");
        rec.kind = AuthKind::GroupPost;
        assert_eq!(rec.context_string(), "0xgroup");
        rec.kind = AuthKind::TokenDistribution;
        assert_eq!(rec.context_string(), "");
    }
}
