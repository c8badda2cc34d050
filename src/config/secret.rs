//! Secure credential handling using the secrecy crate
//!
//! Dropbox and Shopify tokens are held as [`SecretString`] so they are zeroed
//! when dropped and redacted from `Debug` output. Call `expose_secret()` only
//! at the point a request header is built.
//!
//! # Example
//!
//! ```rust
//! use scanroute::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let token = secret_string("sl.example-token".to_string());
//! assert_eq!(token.expose_secret().as_ref(), "sl.example-token");
//! println!("{:?}", token); // Secret([REDACTED ...])
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Newtype wrapper for String that implements the required traits for Secret
#[derive(Clone, Debug, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    /// Borrow the secret as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the secret value is empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// A token or password that is zeroized on drop and never printed
pub type SecretString = Secret<SecretValue>;

/// Wrap a plain string as a [`SecretString`]
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

/// Wrap an optional plain string as an optional [`SecretString`]
#[inline]
pub fn secret_string_opt(value: Option<String>) -> Option<SecretString> {
    value.map(secret_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_string_creation() {
        let secret = secret_string("shpat_123".to_string());
        assert_eq!(secret.expose_secret(), "shpat_123");
    }

    #[test]
    fn test_secret_string_opt() {
        assert!(secret_string_opt(Some("x".to_string())).is_some());
        assert!(secret_string_opt(None).is_none());
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("sl.very-secret".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("sl.very-secret"));
    }

    #[test]
    fn test_blank_secret_is_empty() {
        let secret = secret_string("  ".to_string());
        assert!(secret.expose_secret().is_empty());
    }

    #[test]
    fn test_secret_in_toml() {
        #[derive(Deserialize)]
        struct Section {
            admin_token: SecretString,
        }

        let section: Section = toml::from_str("admin_token = \"shpat_abc\"").unwrap();
        assert_eq!(section.admin_token.expose_secret(), "shpat_abc");
    }
}
