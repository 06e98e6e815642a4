use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;

use crate::error::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const PAYLOAD_VERSION: &str = "v1";

const SALT_LEN: usize = 16;
const IV_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encrypted string as stored by the backend. All fields are standard
/// base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub iv: String,
    pub salt: String,
    pub cipher: String,
    #[serde(default = "default_version")]
    pub version: String,
}

/// Encrypted binary blob. The ciphertext stays raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBytes {
    pub iv: String,
    pub salt: String,
    pub cipher: Vec<u8>,
    pub version: String,
}

fn default_version() -> String {
    PAYLOAD_VERSION.to_string()
}

/// Key derivation settings.
#[derive(Debug, Clone, Copy)]
pub struct E2ee {
    iterations: u32,
}

impl Default for E2ee {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

impl E2ee {
    /// Payloads only decrypt with the iteration count they were sealed with.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.iterations, &mut key);
        key
    }

    fn seal(&self, plaintext: &[u8], passphrase: &str) -> Result<(Vec<u8>, String, String), CryptoError> {
        let mut iv = [0u8; IV_LEN];
        let mut salt = [0u8; SALT_LEN];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut iv);
        rng.fill_bytes(&mut salt);

        let key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::Encrypt)?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CryptoError::Encrypt)?;

        Ok((sealed, STANDARD.encode(iv), STANDARD.encode(salt)))
    }

    fn open(
        &self,
        ciphertext: &[u8],
        iv: &str,
        salt: &str,
        version: &str,
        passphrase: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        if version != PAYLOAD_VERSION {
            return Err(CryptoError::UnsupportedVersion(version.to_string()));
        }

        let iv = decode_field("iv", iv)?;
        if iv.len() != IV_LEN {
            return Err(CryptoError::InvalidPayload(format!(
                "iv must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        let salt = decode_field("salt", salt)?;

        let key = self.derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CryptoError::Decrypt)?;
        cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }

    pub fn encrypt_string(&self, plaintext: &str, passphrase: &str) -> Result<EncryptedPayload, CryptoError> {
        let (sealed, iv, salt) = self.seal(plaintext.as_bytes(), passphrase)?;
        Ok(EncryptedPayload {
            iv,
            salt,
            cipher: STANDARD.encode(sealed),
            version: default_version(),
        })
    }

    pub fn decrypt_string(&self, payload: &EncryptedPayload, passphrase: &str) -> Result<String, CryptoError> {
        let ciphertext = decode_field("cipher", &payload.cipher)?;
        let plain = self.open(
            &ciphertext,
            &payload.iv,
            &payload.salt,
            &payload.version,
            passphrase,
        )?;
        String::from_utf8(plain)
            .map_err(|_| CryptoError::InvalidPayload("plaintext is not UTF-8".into()))
    }

    pub fn encrypt_bytes(&self, data: &[u8], passphrase: &str) -> Result<EncryptedBytes, CryptoError> {
        let (cipher, iv, salt) = self.seal(data, passphrase)?;
        Ok(EncryptedBytes {
            iv,
            salt,
            cipher,
            version: default_version(),
        })
    }

    pub fn decrypt_bytes(&self, payload: &EncryptedBytes, passphrase: &str) -> Result<Vec<u8>, CryptoError> {
        self.open(
            &payload.cipher,
            &payload.iv,
            &payload.salt,
            &payload.version,
            passphrase,
        )
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::InvalidPayload(format!("{}: {}", name, e)))
}

pub fn encrypt_string(plaintext: &str, passphrase: &str) -> Result<EncryptedPayload, CryptoError> {
    E2ee::default().encrypt_string(plaintext, passphrase)
}

pub fn decrypt_string(payload: &EncryptedPayload, passphrase: &str) -> Result<String, CryptoError> {
    E2ee::default().decrypt_string(payload, passphrase)
}

pub fn encrypt_bytes(data: &[u8], passphrase: &str) -> Result<EncryptedBytes, CryptoError> {
    E2ee::default().encrypt_bytes(data, passphrase)
}

pub fn decrypt_bytes(payload: &EncryptedBytes, passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    E2ee::default().decrypt_bytes(payload, passphrase)
}

/// True for objects with string `iv`, `salt` and `cipher` fields.
pub fn is_encrypted_payload(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    ["iv", "salt", "cipher"]
        .iter()
        .all(|field| obj.get(*field).is_some_and(Value::is_string))
}
