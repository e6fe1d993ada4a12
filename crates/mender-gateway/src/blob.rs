//! Read-only access to remote blob storage.

use std::future::Future;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, Url};

use crate::error::BlobError;

/// Azure Storage REST version sent with every request.
const X_MS_VERSION: &str = "2023-11-03";

/// Chunks of a blob in read order. A mid-stream failure ends the stream.
pub type BlobStream = BoxStream<'static, Result<Bytes, BlobError>>;

pub trait BlobStore: Send + Sync + Clone + 'static {
    fn open_read(
        &self,
        container: &str,
        name: &str,
    ) -> impl Future<Output = Result<BlobStream, BlobError>> + Send;
}

/// Azure Blob Storage over plain HTTPS, optionally authorised by a SAS query
/// string.
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    client: Client,
    account_url: String,
    sas_token: Option<String>,
}

impl AzureBlobStore {
    pub fn new(client: Client, account_url: impl Into<String>, sas_token: Option<String>) -> Self {
        Self {
            client,
            account_url: account_url.into(),
            sas_token: sas_token.filter(|sas| !sas.is_empty()),
        }
    }

    /// `<account_url>/<container>/<name>[?<sas>]`. Slashes in `name` are kept
    /// as virtual directories; every segment is percent-encoded.
    pub fn blob_url(&self, container: &str, name: &str) -> Result<Url, BlobError> {
        let open_failed = |reason: String| BlobError::Open {
            container: container.to_string(),
            name: name.to_string(),
            reason,
        };

        let mut url = Url::parse(&self.account_url)
            .map_err(|e| open_failed(format!("invalid account url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| open_failed("account url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(container)
            .extend(name.split('/'));
        if let Some(sas) = &self.sas_token {
            url.set_query(Some(sas.trim_start_matches('?')));
        }
        Ok(url)
    }
}

impl BlobStore for AzureBlobStore {
    async fn open_read(&self, container: &str, name: &str) -> Result<BlobStream, BlobError> {
        let url = self.blob_url(container, name)?;
        let open_failed = |reason: String| BlobError::Open {
            container: container.to_string(),
            name: name.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .header("x-ms-version", X_MS_VERSION)
            .send()
            .await
            .map_err(|e| open_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(open_failed(format!("status {}: {}", status.as_u16(), body)));
        }

        tracing::debug!(
            container,
            name,
            content_length = response.content_length(),
            "Blob opened"
        );

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BlobError::Read(e.to_string())))
            .boxed())
    }
}
