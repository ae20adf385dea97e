//! Cryptographic functions for Traeky
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation for
//! per-profile data, plus the PIN hashing and passphrase derivation schemes.

pub mod encryption;
pub mod key_derivation;
pub mod pin;
pub mod secure_memory;

pub use encryption::{decrypt, decrypt_json, encrypt, encrypt_json};
pub use key_derivation::{derive_key, DerivedKey};
pub use pin::{PassphraseSource, PinKeyDerivation, PinScheme};
pub use secure_memory::SecureString;
