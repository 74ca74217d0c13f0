//! AISStream Credentials
//!
//! AISStream authenticates with a single API key carried in the
//! subscription request. There is no separate handshake: a rejected key is
//! answered with `{"error": "..."}` and the server closes the socket.

/// Errors building credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    /// The API key is empty or whitespace.
    #[error("AISStream API key cannot be empty")]
    EmptyApiKey,
}

/// AISStream API credentials.
///
/// The `Debug` implementation redacts the key for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty after trimming.
    pub fn new(api_key: impl Into<String>) -> Result<Self, CredentialsError> {
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(CredentialsError::EmptyApiKey);
        }
        Ok(Self { api_key })
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_new() {
        let creds = Credentials::new(" my_key ").unwrap();
        assert_eq!(creds.api_key(), "my_key");
    }

    #[test]
    fn empty_key_fails() {
        assert_eq!(Credentials::new(""), Err(CredentialsError::EmptyApiKey));
        assert_eq!(Credentials::new("   "), Err(CredentialsError::EmptyApiKey));
    }

    #[test]
    fn debug_redacts_key() {
        let creds = Credentials::new("super_secret").unwrap();
        let debug = format!("{creds:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret"));
    }
}
