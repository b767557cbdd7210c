use std::fmt;

use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of leading characters kept when a credential is rendered for logs.
const VISIBLE_PREFIX: usize = 4;

/// Credentials shorter than this are fully masked when rendered.
const MIN_LEN_FOR_PREFIX: usize = 12;

/// Errors produced while constructing a [`Credential`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential is empty")]
    Empty,

    #[error("stored credential is not valid UTF-8")]
    InvalidEncoding,
}

/// Opaque bearer credential.
///
/// The value is never printed: both `Debug` and `Display` mask it, and the
/// backing buffer is wiped when the last copy is dropped. No internal
/// structure is assumed beyond "fits in an HTTP header" and "round-trips
/// through a byte store".
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token, rejecting blank input.
    pub fn new(value: impl Into<String>) -> Result<Self, CredentialError> {
        let mut value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            value.zeroize();
            return Err(CredentialError::Empty);
        }
        if trimmed.len() != value.len() {
            let owned = trimmed.to_string();
            value.zeroize();
            return Ok(Self(owned));
        }
        Ok(Self(value))
    }

    /// Decode a credential previously written with [`Credential::as_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CredentialError> {
        let text =
            std::str::from_utf8(bytes).map_err(|_| CredentialError::InvalidEncoding)?;
        Self::new(text)
    }

    /// Raw token text. Only hand this to transports, never to logs.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Byte form used by token stores.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// `Authorization` header value for this credential.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// Masked rendering safe for logs.
    pub fn redacted(&self) -> String {
        if self.0.chars().count() < MIN_LEN_FOR_PREFIX {
            return "***".to_string();
        }
        let prefix: String = self.0.chars().take(VISIBLE_PREFIX).collect();
        format!("{prefix}***")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.redacted()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_values() {
        assert_eq!(Credential::new("").unwrap_err(), CredentialError::Empty);
        assert_eq!(Credential::new("   \n").unwrap_err(), CredentialError::Empty);
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let credential = Credential::new("  tok1\n").expect("valid credential");
        assert_eq!(credential.expose(), "tok1");
    }

    #[test]
    fn from_bytes_rejects_invalid_utf8() {
        let err = Credential::from_bytes(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err, CredentialError::InvalidEncoding);
    }

    #[test]
    fn bytes_survive_a_store_round_trip() {
        let credential = Credential::new("eyJhbGciOi.payload.sig").unwrap();
        let restored = Credential::from_bytes(credential.as_bytes()).unwrap();
        assert_eq!(credential, restored);
    }

    #[test]
    fn bearer_header_value() {
        let credential = Credential::new("tok1").unwrap();
        assert_eq!(credential.bearer(), "Bearer tok1");
    }

    #[test]
    fn debug_and_display_never_leak_the_token() {
        let short = Credential::new("tok1").unwrap();
        assert_eq!(format!("{short}"), "***");
        assert!(!format!("{short:?}").contains("tok1"));

        let long = Credential::new("abcdefghijklmnopqrstuvwxyz").unwrap();
        assert_eq!(format!("{long}"), "abcd***");
        assert!(!format!("{long:?}").contains("efgh"));
    }
}
