//! Exchange user credentials for a management API bearer token.

use reqwest::header::ACCEPT;

use crate::error::AuthError;
use crate::relay::HttpRelay;
use crate::routes::{Route, RouteTable};

/// Opaque JWT returned by the login endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(..)")
    }
}

#[derive(Debug, Clone)]
pub struct TokenBroker {
    relay: HttpRelay,
    scheme: String,
}

impl TokenBroker {
    pub fn new(relay: HttpRelay, scheme: impl Into<String>) -> Self {
        Self {
            relay,
            scheme: scheme.into(),
        }
    }

    /// POST to the login path with Basic auth. Exactly one attempt.
    ///
    /// A 200 body is the token, taken as raw text. Any other status is
    /// [`AuthError::Rejected`].
    pub async fn authenticate(
        &self,
        routes: &RouteTable,
        domain: &str,
        email: &str,
        password: &str,
    ) -> Result<BearerToken, AuthError> {
        let url = routes.url(&self.scheme, domain, Route::Login, &[]);
        let builder = self
            .relay
            .client()
            .post(url)
            .basic_auth(email, Some(password))
            .header(ACCEPT, "application/jwt");

        let result = self.relay.execute(builder).await?;
        if result.status != 200 {
            tracing::warn!(domain, status = result.status, "Login rejected");
            return Err(AuthError::Rejected {
                status: result.status,
                body: result.body_text(),
            });
        }

        let token = result.body_text();
        if token.trim().is_empty() {
            return Err(AuthError::Rejected {
                status: result.status,
                body: "empty token".to_string(),
            });
        }
        Ok(BearerToken(token))
    }
}
