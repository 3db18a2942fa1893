// Path: crates/crypto/src/tag.rs

//! HMAC integrity tags over persisted state.
//!
//! The tag key is stable per node and lives outside the tagged files, so an
//! actor with write access to the data directory but not the key cannot
//! forge replication state.

use bytecave_types::error::CryptoError;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

const KEY_LEN: usize = 32;

/// Stamps and checks integrity tags for on-disk state records.
#[derive(Clone)]
pub struct StateTagger {
    key: [u8; KEY_LEN],
}

impl StateTagger {
    /// A tagger with an explicit key, for tests and embedding.
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        StateTagger { key }
    }

    /// Loads the node's tag key from `path`, creating it on first start.
    /// The file holds the key hex-encoded and is readable by the owner only.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let raw = hex::decode(text.trim())
                .map_err(|e| CryptoError::InvalidKey(format!("bad key file: {e}")))?;
            let key: [u8; KEY_LEN] = raw
                .try_into()
                .map_err(|_| CryptoError::InvalidKey("key file must hold 32 bytes".into()))?;
            return Ok(StateTagger { key });
        }

        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, hex::encode(key))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!(target: "crypto", event = "tag_key_created", path = %path.display());
        Ok(StateTagger { key })
    }

    /// Tags a canonicalized field tuple. Fields are length-delimited before
    /// hashing so no two tuples collide by concatenation.
    pub fn tag(&self, fields: &[&str]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        for field in fields {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field.as_bytes());
        }
        hex::encode(mac.finalize().into_bytes())
    }

    /// Whether `tag` matches the field tuple. Constant time.
    pub fn verify(&self, tag: &str, fields: &[&str]) -> bool {
        let Ok(expected) = hex::decode(tag) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        for field in fields {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field.as_bytes());
        }
        mac.verify_slice(&expected).is_ok()
    }
}

impl std::fmt::Debug for StateTagger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("StateTagger(..)")
    }
}
