//! Secure memory handling for PINs and derived passphrases
//!
//! Provides a string type that zeroes its contents on drop so secrets do not
//! linger in memory after a session ends.

use std::fmt;
use std::ops::Deref;

use zeroize::Zeroize;

/// A string type that zeros its contents on drop
///
/// Use this for PINs, passphrases and the legacy app key.
#[derive(Clone, PartialEq, Eq)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new SecureString
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    /// Get the string contents
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Get the length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl Deref for SecureString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl AsRef<str> for SecureString {
    fn as_ref(&self) -> &str {
        &self.inner
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Don't print the contents in Debug output
impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("len", &self.inner.len())
            .finish()
    }
}

// Don't print the contents in Display output
impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED {} bytes]", self.inner.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_creation() {
        let s = SecureString::new("1234");
        assert_eq!(s.as_str(), "1234");
        assert_eq!(s.len(), 4);
    }

    #[test]
    fn test_secure_string_conversions() {
        let a: SecureString = String::from("pin").into();
        let b: SecureString = "pin".into();
        assert_eq!(a, b);
    }

    #[test]
    fn test_secure_string_redacts() {
        let s = SecureString::new("secret");
        let debug = format!("{:?}", s);
        let display = format!("{}", s);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("SecureString"));
        assert!(!display.contains("secret"));
        assert!(display.contains("REDACTED"));
    }
}
