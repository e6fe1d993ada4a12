//! One outbound HTTP call per request, body read in full.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};

use crate::error::TransportError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("mender-gateway/", env!("CARGO_PKG_VERSION"));

/// Status and body of an upstream response, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResult {
    pub status: u16,
    pub body: Bytes,
}

impl RelayResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Build the shared upstream client. Certificates are verified unless the
/// `insecure-tls` feature is compiled in and `accept_invalid_certs` is set.
pub fn build_client(accept_invalid_certs: bool) -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(USER_AGENT);

    #[cfg(feature = "insecure-tls")]
    let builder = if accept_invalid_certs {
        tracing::warn!("Upstream TLS certificate verification is DISABLED");
        builder.danger_accept_invalid_certs(true)
    } else {
        builder
    };

    #[cfg(not(feature = "insecure-tls"))]
    if accept_invalid_certs {
        tracing::warn!(
            "Ignoring request to disable TLS verification: built without the insecure-tls feature"
        );
    }

    builder.build()
}

#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
}

impl HttpRelay {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send `body` (JSON unless a content type is set later) with a bearer token.
    pub async fn call(
        &self,
        method: Method,
        url: &str,
        token: &str,
        body: Option<Vec<u8>>,
    ) -> Result<RelayResult, TransportError> {
        let mut builder = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.execute(builder).await
    }

    /// Execute a prepared request and read the whole response body.
    ///
    /// A request that has a body but no `Content-Type` is sent as JSON.
    /// Non-2xx statuses are returned, not treated as errors.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<RelayResult, TransportError> {
        let mut request = builder.build().map_err(TransportError::Build)?;
        if request.body().is_some() && !request.headers().contains_key(CONTENT_TYPE) {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let method = request.method().clone();
        let url = request.url().clone();
        let response = self
            .client
            .execute(request)
            .await
            .map_err(TransportError::Connect)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(TransportError::Body)?;

        tracing::debug!(%method, %url, status, bytes = body.len(), "Upstream responded");

        Ok(RelayResult { status, body })
    }
}
