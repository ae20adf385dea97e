//! AES-256-GCM encryption of JSON values under a passphrase
//!
//! Every call draws a fresh salt and nonce, derives the key with Argon2id and
//! produces a self-describing [`EncryptedPayload`]. Authentication failures
//! always surface as [`TraekyError::Decryption`]; nothing is returned unless
//! the tag verifies.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{TraekyError, TraekyResult};
use crate::models::payload::{EncryptedPayload, PAYLOAD_ALGORITHM, PAYLOAD_VERSION};

use super::key_derivation::{derive_key, SALT_SIZE};

/// Size of the AES-GCM nonce in bytes (96 bits)
const NONCE_SIZE: usize = 12;

/// Encrypt raw bytes under a passphrase
pub fn encrypt(plaintext: &[u8], passphrase: &str) -> TraekyResult<EncryptedPayload> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(passphrase, &salt)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| TraekyError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| TraekyError::Encryption(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedPayload {
        version: PAYLOAD_VERSION,
        algorithm: PAYLOAD_ALGORITHM.to_string(),
        salt: STANDARD.encode(salt),
        iv: STANDARD.encode(nonce_bytes),
        ciphertext: STANDARD.encode(ciphertext),
        scope: None,
    })
}

/// Decrypt an envelope back to raw bytes
pub fn decrypt(payload: &EncryptedPayload, passphrase: &str) -> TraekyResult<Vec<u8>> {
    if payload.version != PAYLOAD_VERSION {
        return Err(TraekyError::Encryption(format!(
            "Unsupported payload version: {}",
            payload.version
        )));
    }
    if payload.algorithm != PAYLOAD_ALGORITHM {
        return Err(TraekyError::Encryption(format!(
            "Unsupported algorithm: {}",
            payload.algorithm
        )));
    }

    let salt = decode_field("salt", &payload.salt)?;
    let nonce_bytes = decode_field("iv", &payload.iv)?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(TraekyError::Encryption(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce_bytes.len()
        )));
    }
    let ciphertext = decode_field("ciphertext", &payload.ciphertext)?;

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| TraekyError::Encryption(format!("Failed to create cipher: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| TraekyError::Decryption)
}

/// JSON-serialize a value and encrypt it
pub fn encrypt_json<T: Serialize>(value: &T, passphrase: &str) -> TraekyResult<EncryptedPayload> {
    let plaintext = serde_json::to_vec(value)?;
    encrypt(&plaintext, passphrase)
}

/// Decrypt an envelope and parse the plaintext as JSON
///
/// A plaintext that authenticates but does not parse is reported as
/// [`TraekyError::Json`], never as a wrong passphrase.
pub fn decrypt_json<T: DeserializeOwned>(
    payload: &EncryptedPayload,
    passphrase: &str,
) -> TraekyResult<T> {
    let plaintext = decrypt(payload, passphrase)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

fn decode_field(name: &str, value: &str) -> TraekyResult<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| TraekyError::Encryption(format!("Invalid {} encoding: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encrypt_decrypt_json() {
        let value = json!({"transactions": [{"id": 1}], "nextTransactionId": 2});

        let payload = encrypt_json(&value, "passphrase").unwrap();
        let back: serde_json::Value = decrypt_json(&payload, "passphrase").unwrap();

        assert_eq!(value, back);
        assert_eq!(payload.algorithm, "AES-GCM");
        assert_eq!(payload.version, 1);
        assert!(payload.scope.is_none());
    }

    #[test]
    fn test_fresh_salt_and_nonce_each_call() {
        let value = json!("same");
        let a = encrypt_json(&value, "k").unwrap();
        let b = encrypt_json(&value, "k").unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_wrong_passphrase_is_decryption_error() {
        let payload = encrypt_json(&json!({"a": 1}), "right").unwrap();
        let result: TraekyResult<serde_json::Value> = decrypt_json(&payload, "wrong");
        assert!(matches!(result, Err(TraekyError::Decryption)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let mut payload = encrypt(b"Hello, World!", "k").unwrap();

        let mut ciphertext = STANDARD.decode(&payload.ciphertext).unwrap();
        ciphertext[0] ^= 0xFF;
        payload.ciphertext = STANDARD.encode(&ciphertext);

        assert!(matches!(decrypt(&payload, "k"), Err(TraekyError::Decryption)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut payload = encrypt(b"data", "k").unwrap();
        payload.version = 2;
        assert!(matches!(
            decrypt(&payload, "k"),
            Err(TraekyError::Encryption(_))
        ));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let mut payload = encrypt(b"data", "k").unwrap();
        payload.iv = "not base64!".into();
        assert!(matches!(
            decrypt(&payload, "k"),
            Err(TraekyError::Encryption(_))
        ));
    }

    #[test]
    fn test_empty_plaintext() {
        let payload = encrypt(b"", "k").unwrap();
        assert!(decrypt(&payload, "k").unwrap().is_empty());
    }
}
