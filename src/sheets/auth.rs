use tracing::debug;
use yup_oauth2::authenticator::{Authenticator, DefaultHyperClient, HyperClientBuilder};
use yup_oauth2::ServiceAccountAuthenticator;

use super::SheetsError;
use crate::models::Credentials;

const SCOPES: &[&str] = &["https://www.googleapis.com/auth/spreadsheets"];

// Convenience type alias.
type DefaultConnector = <DefaultHyperClient as HyperClientBuilder>::Connector;

/// Supplies bearer tokens for Sheets API requests
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, SheetsError>;
}

/// OAuth2 service-account flow. The authenticator caches and refreshes tokens.
pub struct ServiceAccountTokens {
    auth: Authenticator<DefaultConnector>,
}

impl ServiceAccountTokens {
    /// The service account needs editor access to the target spreadsheet.
    pub async fn new(credentials: &Credentials) -> Result<Self, SheetsError> {
        let auth = ServiceAccountAuthenticator::builder(credentials.service_account_key())
            .build()
            .await
            .map_err(SheetsError::AuthSetup)?;
        debug!("Service account authenticator ready for {}", credentials.client_email());
        Ok(Self { auth })
    }
}

#[async_trait::async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, SheetsError> {
        let token = self
            .auth
            .token(SCOPES)
            .await
            .map_err(|e| SheetsError::Auth(e.to_string()))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| SheetsError::Auth("token response carried no access token".to_string()))
    }
}

/// Fixed token, for pre-authorized environments and tests.
pub struct StaticToken(pub String);

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, SheetsError> {
        Ok(self.0.clone())
    }
}
