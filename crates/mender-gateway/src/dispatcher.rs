//! Turns one inbound message into at most one published response.
//!
//! Per message: match the subject, parse the payload, obtain a token, call
//! the management API (or stream an artifact), publish the result, ack.
//! Every failure short of publishing ends the handler without a response;
//! the message is acknowledged regardless so it is never redelivered.

use std::future::Future;
use std::time::Duration;

use async_nats::jetstream;
use bytes::Bytes;
use mender_nats::{DurablePublisher, headers_with_trace_context};
use reqwest::Method;
use tracing::Instrument;

use crate::blob::{AzureBlobStore, BlobStore};
use crate::config::GatewayConfig;
use crate::error::{AuthError, GatewayError, ParseError, TransportError};
use crate::messages::{Credentials, InboundRequest, Request};
use crate::relay::{HttpRelay, RelayResult, build_client};
use crate::routes::{Route, RouteTable};
use crate::subjects::Operation;
use crate::token::{BearerToken, TokenBroker};
use crate::upload::ArtifactUploader;

/// Response header carrying the upstream HTTP status.
pub const STATUS_CODE_HEADER: &str = "StatusCode";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(60);

/// What the dispatcher needs from a broker message.
pub trait InboundMessage: Send + Sync {
    type AckError: std::fmt::Display + Send;

    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    fn ack(&self) -> impl Future<Output = Result<(), Self::AckError>> + Send;
}

impl InboundMessage for jetstream::Message {
    type AckError = async_nats::Error;

    fn subject(&self) -> &str {
        self.message.subject.as_str()
    }

    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    async fn ack(&self) -> Result<(), Self::AckError> {
        jetstream::Message::ack(self).await
    }
}

/// Terminal state of one handled message.
#[derive(Debug)]
pub enum Outcome {
    Published { subject: String, status: u16 },
    /// Subject matched no operation.
    Ignored,
    Failed(GatewayError),
}

pub struct Dispatcher<P, B> {
    routes: RouteTable,
    relay: HttpRelay,
    broker: TokenBroker,
    uploader: ArtifactUploader<B>,
    publisher: P,
    scheme: String,
    request_timeout: Duration,
    list_timeout: Duration,
}

impl<P, B> Dispatcher<P, B>
where
    P: DurablePublisher,
    B: BlobStore,
{
    pub fn new(
        routes: RouteTable,
        relay: HttpRelay,
        uploader: ArtifactUploader<B>,
        publisher: P,
        scheme: impl Into<String>,
    ) -> Self {
        let scheme = scheme.into();
        Self {
            routes,
            broker: TokenBroker::new(relay.clone(), scheme.clone()),
            relay,
            uploader,
            publisher,
            scheme,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            list_timeout: DEFAULT_LIST_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, request: Duration, list: Duration) -> Self {
        self.request_timeout = request;
        self.list_timeout = list;
        self
    }

    /// Handle one message, then acknowledge it whatever the outcome.
    pub async fn process<M: InboundMessage>(&self, msg: M) -> Outcome {
        let span = tracing::info_span!(
            "dispatch",
            subject = %msg.subject(),
            request_id = tracing::field::Empty,
        );

        async {
            let outcome = self.dispatch(msg.subject(), msg.payload()).await;
            log_outcome(&outcome);

            if let Err(e) = msg.ack().await {
                tracing::warn!(error = %e, "Failed to ack JetStream message");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Everything in [`process`](Self::process) except the acknowledgement.
    pub async fn dispatch(&self, subject: &str, payload: &[u8]) -> Outcome {
        let Some(operation) = Operation::from_subject(subject) else {
            return Outcome::Ignored;
        };

        let (response_subject, result) = match self.handle(operation, payload).await {
            Ok(handled) => handled,
            Err(e) => return Outcome::Failed(e),
        };

        match self.publish(response_subject.clone(), &result).await {
            Ok(()) => Outcome::Published {
                subject: response_subject,
                status: result.status,
            },
            Err(e) => Outcome::Failed(e),
        }
    }

    async fn handle(
        &self,
        operation: Operation,
        payload: &[u8],
    ) -> Result<(String, RelayResult), GatewayError> {
        let request = Request::parse(operation, payload)?;
        let request_id = &request.base().request_id;
        tracing::Span::current().record("request_id", request_id.as_str());
        tracing::debug!(%operation, domain = %request.base().domain, "Request parsed");

        let deadline = self.deadline(operation);
        let result = tokio::time::timeout(deadline, self.call(&request))
            .await
            .map_err(|_| TransportError::Timeout(deadline))??;

        Ok((operation.response_subject(request_id), result))
    }

    fn deadline(&self, operation: Operation) -> Duration {
        match operation {
            Operation::ListDevices => self.list_timeout,
            _ => self.request_timeout,
        }
    }

    async fn call(&self, request: &Request) -> Result<RelayResult, GatewayError> {
        match request {
            Request::Login(base) => {
                let Credentials::Password { email, password } = &base.credentials else {
                    return Err(ParseError::Invalid("login requires email and password").into());
                };
                let token = self
                    .broker
                    .authenticate(&self.routes, &base.domain, email, password)
                    .await?;
                Ok(RelayResult {
                    status: 200,
                    body: Bytes::from(token.as_str().to_owned()),
                })
            }
            Request::ListDevices(base) => {
                let token = self.token_for(base).await?;
                let url = self.url(base, Route::DeviceList, &[]);
                Ok(self.relay.call(Method::GET, &url, token.as_str(), None).await?)
            }
            Request::Preauthorize(req) => {
                let token = self.token_for(&req.base).await?;
                let body = serde_json::to_vec(&req.body()).map_err(ParseError::from)?;
                let url = self.url(&req.base, Route::DeviceList, &[]);
                Ok(self
                    .relay
                    .call(Method::POST, &url, token.as_str(), Some(body))
                    .await?)
            }
            Request::AuthSet(req) => {
                let token = self.token_for(&req.base).await?;
                let body = serde_json::to_vec(&req.body()).map_err(ParseError::from)?;
                let url = self.url(
                    &req.base,
                    Route::DeviceAuthSetStatus,
                    &[&req.device_id, &req.auth_set_id],
                );
                Ok(self
                    .relay
                    .call(Method::PUT, &url, token.as_str(), Some(body))
                    .await?)
            }
            Request::UploadArtifact(req) => {
                let token = self.token_for(&req.base).await?;
                Ok(self
                    .uploader
                    .upload(
                        &self.routes,
                        &req.blob_container,
                        &req.blob_name,
                        &req.description,
                        &req.base.domain,
                        token.as_str(),
                    )
                    .await?)
            }
        }
    }

    /// The caller's token, or a fresh one from the login endpoint.
    async fn token_for(&self, base: &InboundRequest) -> Result<BearerToken, AuthError> {
        match &base.credentials {
            Credentials::Token(token) => Ok(BearerToken::new(token.clone())),
            Credentials::Password { email, password } => {
                self.broker
                    .authenticate(&self.routes, &base.domain, email, password)
                    .await
            }
        }
    }

    fn url(&self, base: &InboundRequest, route: Route, params: &[&str]) -> String {
        self.routes.url(&self.scheme, &base.domain, route, params)
    }

    async fn publish(&self, subject: String, result: &RelayResult) -> Result<(), GatewayError> {
        let mut headers = headers_with_trace_context();
        headers.insert(STATUS_CODE_HEADER, result.status.to_string().as_str());

        self.publisher
            .publish_durable(subject.clone(), headers, result.body.clone())
            .await
            .map_err(|e| GatewayError::Publish {
                subject,
                reason: e.to_string(),
            })
    }
}

impl<P: DurablePublisher> Dispatcher<P, AzureBlobStore> {
    /// Production wiring: one HTTP client shared by the relay, the token
    /// broker and blob reads.
    pub fn from_config(config: &GatewayConfig, publisher: P) -> Result<Self, reqwest::Error> {
        let client = build_client(config.accept_invalid_certs)?;
        let relay = HttpRelay::new(client.clone());
        let blobs = AzureBlobStore::new(
            client,
            config.blob_account_url.clone(),
            config.blob_sas_token.clone(),
        );
        let uploader = ArtifactUploader::new(blobs, relay.clone(), config.scheme.clone())
            .with_pipe_capacity(config.upload_pipe_capacity);

        Ok(Self::new(
            RouteTable::management(),
            relay,
            uploader,
            publisher,
            config.scheme.clone(),
        )
        .with_timeouts(config.request_timeout, config.list_timeout))
    }
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Published { subject, status } => {
            tracing::info!(response_subject = %subject, status, "Response published");
        }
        Outcome::Ignored => {
            tracing::debug!("No operation matches subject; ignoring");
        }
        Outcome::Failed(e @ GatewayError::Publish { .. }) => {
            tracing::error!(kind = e.kind(), error = %e, "Response could not be published");
        }
        Outcome::Failed(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "Request failed; no response published");
        }
    }
}
