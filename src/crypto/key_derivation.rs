//! Key derivation using Argon2id
//!
//! Derives AES-256 keys from passphrases using Argon2id. The parameters are
//! fixed: every envelope ever written must be readable with the same cost
//! settings, because the envelope format carries only the salt.
//!
//! | Parameter   | Value      |
//! |-------------|------------|
//! | Algorithm   | Argon2id   |
//! | Memory cost | 19 456 KiB |
//! | Time cost   | 2 passes   |
//! | Parallelism | 1 lane     |
//! | Output      | 32 bytes   |

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{TraekyError, TraekyResult};

/// Memory cost in KiB
pub const KDF_MEMORY_COST: u32 = 19_456;
/// Number of passes
pub const KDF_TIME_COST: u32 = 2;
/// Degree of parallelism
pub const KDF_PARALLELISM: u32 = 1;
/// Length of the random salt stored in every envelope
pub const SALT_SIZE: usize = 16;

/// A derived encryption key
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    /// The 32-byte key for AES-256
    key: [u8; 32],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Derive an encryption key from a passphrase and salt
pub fn derive_key(passphrase: &str, salt: &[u8]) -> TraekyResult<DerivedKey> {
    let params = Params::new(KDF_MEMORY_COST, KDF_TIME_COST, KDF_PARALLELISM, Some(32))
        .map_err(|e| TraekyError::Encryption(format!("Invalid Argon2 parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| TraekyError::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey { key })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: [u8; SALT_SIZE] = [7u8; SALT_SIZE];

    #[test]
    fn test_same_passphrase_same_key() {
        let key1 = derive_key("test_passphrase", &SALT).unwrap();
        let key2 = derive_key("test_passphrase", &SALT).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let key1 = derive_key("passphrase1", &SALT).unwrap();
        let key2 = derive_key("passphrase2", &SALT).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let key1 = derive_key("same_passphrase", &SALT).unwrap();
        let key2 = derive_key("same_passphrase", &[9u8; SALT_SIZE]).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_short_salt_rejected() {
        assert!(derive_key("passphrase", &[1u8; 4]).is_err());
    }
}
