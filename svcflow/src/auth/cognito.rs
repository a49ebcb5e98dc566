//! Cognito `InitiateAuth` user/password login.

use super::{CredentialProvider, Token};
use crate::errors::AuthError;
use crate::transport::{HttpRequest, Transport};
use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where the id token sits in an `InitiateAuth` response.
pub const ID_TOKEN_PATH: &str = "AuthenticationResult.IdToken";

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const INITIATE_AUTH_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";

/// User pool login details.
#[derive(Clone, Default)]
pub struct CognitoCredentials {
    /// The identity endpoint URL.
    pub auth_url: String,
    /// The user name.
    pub username: String,
    /// The password.
    pub password: String,
    /// The app client id.
    pub client_id: String,
}

impl fmt::Debug for CognitoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CognitoCredentials")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// Logs in with `USER_PASSWORD_AUTH` and returns the id token.
pub struct CognitoCredentialProvider {
    transport: Arc<dyn Transport>,
    credentials: CognitoCredentials,
}

impl CognitoCredentialProvider {
    /// Creates a provider that logs in through the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, credentials: CognitoCredentials) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    fn login_request(&self) -> HttpRequest {
        HttpRequest::post(&self.credentials.auth_url)
            .with_header("Content-Type", AMZ_JSON)
            .with_header("X-Amz-Target", INITIATE_AUTH_TARGET)
            .with_body(json!({
                "AuthFlow": "USER_PASSWORD_AUTH",
                "AuthParameters": {
                    "USERNAME": self.credentials.username,
                    "PASSWORD": self.credentials.password,
                },
                "ClientId": self.credentials.client_id,
            }))
    }
}

impl fmt::Debug for CognitoCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CognitoCredentialProvider")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for CognitoCredentialProvider {
    async fn acquire_token(&self) -> Result<Token, AuthError> {
        debug!(
            auth_url = %self.credentials.auth_url,
            username = %self.credentials.username,
            "Requesting id token"
        );

        let response = self
            .transport
            .request(self.login_request())
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        if !response.is_success() {
            warn!(status_code = response.status_code, "Authentication rejected");
            return Err(AuthError::Rejected {
                status_code: response.status_code,
                body: response.body_excerpt(),
            });
        }

        response
            .json_body()
            .and_then(|body| body.pointer("/AuthenticationResult/IdToken"))
            .and_then(serde_json::Value::as_str)
            .filter(|token| !token.is_empty())
            .map(Token::new)
            .ok_or_else(|| AuthError::MissingToken {
                path: ID_TOKEN_PATH.to_string(),
            })
    }
}
