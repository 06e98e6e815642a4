//! Vault encryption
//!
//! Passphrase based AES-256-GCM for vault contents. Payloads are
//! self-describing: each carries its own salt and IV.

pub mod e2ee;

pub use e2ee::{
    decrypt_bytes, decrypt_string, encrypt_bytes, encrypt_string, is_encrypted_payload, E2ee,
    EncryptedBytes, EncryptedPayload, PAYLOAD_VERSION, PBKDF2_ITERATIONS,
};
