//! Credential acquisition.
//!
//! A pipeline run needs exactly one token, acquired before the first
//! stage. Failure to acquire it is fatal for the run and no stage is
//! attempted.

mod cognito;

pub use cognito::{CognitoCredentialProvider, CognitoCredentials, ID_TOKEN_PATH};

use crate::errors::AuthError;
use async_trait::async_trait;
use std::fmt;

/// An opaque credential attached to remote calls.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<redacted, {} chars>)", self.0.len())
    }
}

/// Produces a token for one pipeline run.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Acquires a token.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if no token can be obtained.
    async fn acquire_token(&self) -> Result<Token, AuthError>;
}

/// Hands out a fixed token.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    token: Token,
}

impl StaticCredentialProvider {
    /// Creates a provider for a fixed token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Token::new(token),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn acquire_token(&self) -> Result<Token, AuthError> {
        Ok(self.token.clone())
    }
}
