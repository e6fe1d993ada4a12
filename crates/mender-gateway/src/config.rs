use std::time::Duration;

use mender_nats::{NatsConfig, ReadEnv};

use crate::upload::DEFAULT_PIPE_CAPACITY;

const DEFAULT_STREAM: &str = "MenderUser";
const DEFAULT_CONSUMER: &str = "mender_device";
const DEFAULT_SCHEME: &str = "https";
const DEFAULT_MAX_IN_FLIGHT: usize = 16;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
const DEFAULT_LIST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BLOB_ACCOUNT_URL: &str = "https://menderartifactstorage.blob.core.windows.net";

/// Configuration for the gateway worker.
///
/// Resolved from environment variables:
/// - `MENDER_STREAM`: JetStream stream holding inbound requests (default: `MenderUser`)
/// - `MENDER_CONSUMER`: durable consumer name (default: `mender_device`)
/// - `MENDER_SCHEME`: scheme for management API URLs (default: `https`)
/// - `MENDER_MAX_IN_FLIGHT`: messages handled concurrently (default: 16)
/// - `MENDER_REQUEST_TIMEOUT_SECS`: per-message deadline (default: 600)
/// - `MENDER_LIST_TIMEOUT_SECS`: deadline for device listing (default: 60)
/// - `MENDER_UPLOAD_PIPE_CAPACITY`: chunks buffered between blob and upload (default: 8)
/// - `MENDER_BLOB_ACCOUNT_URL`: blob storage account endpoint
/// - `MENDER_BLOB_SAS_TOKEN`: optional SAS query string for blob reads
/// - `MENDER_DANGER_ACCEPT_INVALID_CERTS`: skip upstream certificate checks;
///   only honoured when built with the `insecure-tls` feature
/// - Standard `NATS_*` variables for the NATS connection (see `mender-nats`)
#[derive(Clone)]
pub struct GatewayConfig {
    pub stream: String,
    pub consumer: String,
    pub scheme: String,
    pub max_in_flight: usize,
    pub request_timeout: Duration,
    pub list_timeout: Duration,
    pub upload_pipe_capacity: usize,
    pub blob_account_url: String,
    pub blob_sas_token: Option<String>,
    pub accept_invalid_certs: bool,
    pub nats: NatsConfig,
}

impl GatewayConfig {
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        Self {
            stream: env
                .var("MENDER_STREAM")
                .unwrap_or_else(|_| DEFAULT_STREAM.to_string()),
            consumer: env
                .var("MENDER_CONSUMER")
                .unwrap_or_else(|_| DEFAULT_CONSUMER.to_string()),
            scheme: env
                .var("MENDER_SCHEME")
                .unwrap_or_else(|_| DEFAULT_SCHEME.to_string()),
            max_in_flight: env
                .parsed_or("MENDER_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT)
                .max(1),
            request_timeout: Duration::from_secs(
                env.parsed_or("MENDER_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            list_timeout: Duration::from_secs(
                env.parsed_or("MENDER_LIST_TIMEOUT_SECS", DEFAULT_LIST_TIMEOUT_SECS),
            ),
            upload_pipe_capacity: env
                .parsed_or("MENDER_UPLOAD_PIPE_CAPACITY", DEFAULT_PIPE_CAPACITY)
                .max(1),
            blob_account_url: env
                .var("MENDER_BLOB_ACCOUNT_URL")
                .unwrap_or_else(|_| DEFAULT_BLOB_ACCOUNT_URL.to_string()),
            blob_sas_token: env
                .var("MENDER_BLOB_SAS_TOKEN")
                .ok()
                .filter(|sas| !sas.is_empty()),
            accept_invalid_certs: env.parsed_or("MENDER_DANGER_ACCEPT_INVALID_CERTS", false),
            nats: NatsConfig::from_env(env),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_stream(mut self, stream: impl Into<String>, consumer: impl Into<String>) -> Self {
        self.stream = stream.into();
        self.consumer = consumer.into();
        self
    }

    pub fn with_timeouts(mut self, request: Duration, list: Duration) -> Self {
        self.request_timeout = request;
        self.list_timeout = list;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn with_blob_account(mut self, url: impl Into<String>, sas_token: Option<String>) -> Self {
        self.blob_account_url = url.into();
        self.blob_sas_token = sas_token;
        self
    }
}
