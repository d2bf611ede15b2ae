//! Key reference resolution.
//!
//! The engine never manages key lifecycle; it resolves a reference to
//! key material scoped to one operation and forgets it afterwards.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

pub const KEY_LEN: usize = 32;
/// AES-GCM standard nonce length.
pub const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("unknown key reference: {0}")]
    UnknownKeyRef(String),
    #[error("invalid key material for {key_ref}: {message}")]
    InvalidMaterial { key_ref: String, message: String },
    #[error("key resolution failed for {key_ref}: {message}")]
    Resolution { key_ref: String, message: String },
}

/// External key-resolution interface.
///
/// Implementations own their transport and deadlines; the engine treats
/// any error as a per-record key-resolution failure.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, key_ref: &str) -> Result<[u8; KEY_LEN], KeyError>;
}

/// Resolver over key material loaded from run configuration.
#[derive(Clone, Default)]
pub struct StaticKeyResolver {
    keys: BTreeMap<String, [u8; KEY_LEN]>,
}

// Key material must never reach logs or error output.
impl std::fmt::Debug for StaticKeyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeyResolver")
            .field("key_refs", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StaticKeyResolver {
    pub fn new(keys: BTreeMap<String, [u8; KEY_LEN]>) -> Self {
        Self { keys }
    }

    /// Build from base64-encoded 32-byte keys, as stored in run config.
    pub fn from_base64(entries: &BTreeMap<String, String>) -> Result<Self, KeyError> {
        let mut keys = BTreeMap::new();
        for (key_ref, encoded) in entries {
            let decoded =
                BASE64
                    .decode(encoded.trim().as_bytes())
                    .map_err(|e| KeyError::InvalidMaterial {
                        key_ref: key_ref.clone(),
                        message: e.to_string(),
                    })?;
            if decoded.len() != KEY_LEN {
                return Err(KeyError::InvalidMaterial {
                    key_ref: key_ref.clone(),
                    message: format!("expected {KEY_LEN} bytes, got {}", decoded.len()),
                });
            }
            let mut key = [0u8; KEY_LEN];
            key.copy_from_slice(&decoded);
            keys.insert(key_ref.clone(), key);
        }
        Ok(Self { keys })
    }

    pub fn key_refs(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn contains(&self, key_ref: &str) -> bool {
        self.keys.contains_key(key_ref)
    }
}

impl KeyResolver for StaticKeyResolver {
    fn resolve(&self, key_ref: &str) -> Result<[u8; KEY_LEN], KeyError> {
        self.keys
            .get(key_ref)
            .copied()
            .ok_or_else(|| KeyError::UnknownKeyRef(key_ref.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_refs() {
        let mut entries = BTreeMap::new();
        entries.insert("patient-data-key".to_string(), BASE64.encode([7u8; 32]));
        let resolver = StaticKeyResolver::from_base64(&entries).unwrap();
        assert_eq!(resolver.resolve("patient-data-key").unwrap(), [7u8; 32]);
        assert!(matches!(
            resolver.resolve("other"),
            Err(KeyError::UnknownKeyRef(_))
        ));
    }

    #[test]
    fn rejects_short_key_material() {
        let mut entries = BTreeMap::new();
        entries.insert("short".to_string(), BASE64.encode([1u8; 16]));
        assert!(matches!(
            StaticKeyResolver::from_base64(&entries),
            Err(KeyError::InvalidMaterial { .. })
        ));
    }
}
