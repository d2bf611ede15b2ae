//! Authenticated field-level encryption.
//!
//! Designated fields are replaced by `{ciphertext, keyRef, algorithm,
//! nonce}`; AES-256-GCM makes tampering detectable on decrypt. The
//! invariant is fail-closed: a field that must be encrypted (schema
//! sensitivity or a PII finding) with no spec entry is a per-record
//! error, never a silent skip.

use std::collections::BTreeSet;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;

use phi_model::{Algorithm, EncryptedValue, EncryptionSpec, FieldKeySpec, FieldValue, Record};

use crate::keys::{KeyError, KeyResolver, NONCE_LEN};

/// Errors never carry plaintext or key material.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("sensitive field {0} has no encryption spec entry")]
    MissingSpec(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("encryption failed for field {0}")]
    Encrypt(String),
    #[error("decryption rejected: ciphertext failed authentication")]
    Decrypt,
    #[error("invalid encrypted payload: {0}")]
    Payload(String),
}

/// Encrypts designated fields of a record using referenced keys.
pub struct FieldEncryptor<'a> {
    spec: &'a EncryptionSpec,
    resolver: &'a dyn KeyResolver,
}

impl<'a> FieldEncryptor<'a> {
    pub fn new(spec: &'a EncryptionSpec, resolver: &'a dyn KeyResolver) -> Self {
        Self { spec, resolver }
    }

    /// Encrypt every spec-listed field present in the record.
    ///
    /// `required_sensitive` names top-level fields that must not leave
    /// the engine unencrypted; any of them present without a spec entry
    /// rejects the record.
    pub fn encrypt_record(
        &self,
        record: &Record,
        required_sensitive: &BTreeSet<String>,
    ) -> Result<Record, CryptoError> {
        for field in required_sensitive {
            if record.fields.contains_key(field) && self.spec.get(field).is_none() {
                return Err(CryptoError::MissingSpec(field.clone()));
            }
        }

        let mut fields = record.fields.clone();
        let mut encrypted = 0usize;
        for (name, key_spec) in self.spec.fields() {
            let Some(value) = fields.get(name) else {
                continue;
            };
            if matches!(value, FieldValue::Encrypted(_)) {
                continue;
            }
            let sealed = self.encrypt_value(name, value, key_spec)?;
            fields.insert(name.to_string(), FieldValue::Encrypted(sealed));
            encrypted += 1;
        }

        debug!(
            record_id = %record.record_id,
            fields = encrypted,
            "field encryption complete"
        );
        Ok(record.with_fields(fields))
    }

    fn encrypt_value(
        &self,
        field: &str,
        value: &FieldValue,
        key_spec: &FieldKeySpec,
    ) -> Result<EncryptedValue, CryptoError> {
        let key = self.resolver.resolve(&key_spec.key_ref)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| CryptoError::Encrypt(field.to_string()))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let plaintext = serde_json::to_vec(value)
            .map_err(|_| CryptoError::Encrypt(field.to_string()))?;
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| CryptoError::Encrypt(field.to_string()))?;

        Ok(EncryptedValue {
            ciphertext: BASE64.encode(ciphertext),
            key_ref: key_spec.key_ref.clone(),
            algorithm: key_spec.algorithm.as_str().to_string(),
            nonce: BASE64.encode(nonce_bytes),
        })
    }

    /// Dual operation for downstream authorized readers. Rejects on
    /// authentication-tag mismatch instead of returning corrupted
    /// plaintext.
    pub fn decrypt_field(&self, sealed: &EncryptedValue) -> Result<FieldValue, CryptoError> {
        if sealed.algorithm != Algorithm::Aes256Gcm.as_str() {
            return Err(CryptoError::Payload(format!(
                "unsupported algorithm {:?}",
                sealed.algorithm
            )));
        }

        let key = self.resolver.resolve(&sealed.key_ref)?;
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::Decrypt)?;

        let nonce_raw = BASE64
            .decode(sealed.nonce.as_bytes())
            .map_err(|e| CryptoError::Payload(e.to_string()))?;
        if nonce_raw.len() != NONCE_LEN {
            return Err(CryptoError::Payload(format!(
                "nonce must be {NONCE_LEN} bytes"
            )));
        }
        let ciphertext = BASE64
            .decode(sealed.ciphertext.as_bytes())
            .map_err(|e| CryptoError::Payload(e.to_string()))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_raw), ciphertext.as_ref())
            .map_err(|_| CryptoError::Decrypt)?;
        serde_json::from_slice(&plaintext).map_err(|e| CryptoError::Payload(e.to_string()))
    }
}
