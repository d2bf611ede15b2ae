//! Field-level encryption for records leaving the compliance engine.

mod encryptor;
mod keys;

pub use encryptor::{CryptoError, FieldEncryptor};
pub use keys::{KEY_LEN, KeyError, KeyResolver, NONCE_LEN, StaticKeyResolver};
