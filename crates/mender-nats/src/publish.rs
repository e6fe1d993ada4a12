//! Publishing that completes only once the broker has taken the message.

use std::error::Error;
use std::future::Future;

use async_nats::HeaderMap;
use async_nats::jetstream;
use bytes::Bytes;
use opentelemetry::propagation::Injector;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Publish one message with headers and wait for the broker to confirm it.
///
/// Swap in [`MockPublisher`](crate::mocks::MockPublisher)
/// to observe published responses in tests.
pub trait DurablePublisher: Send + Sync + Clone + 'static {
    type Error: Error + Send + Sync + 'static;

    fn publish_durable(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// JetStream publish: resolves after the stream has stored the message (`PubAck`).
impl DurablePublisher for jetstream::Context {
    type Error = jetstream::context::PublishError;

    async fn publish_durable(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<(), Self::Error> {
        let ack = self.publish_with_headers(subject, headers, payload).await?;
        ack.await?;
        Ok(())
    }
}

struct HeaderMapCarrier<'a>(&'a mut HeaderMap);

impl Injector for HeaderMapCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

/// Headers carrying the current span's trace context, if a propagator is installed.
pub fn headers_with_trace_context() -> HeaderMap {
    let mut headers = HeaderMap::new();
    let cx = Span::current().context();
    opentelemetry::global::get_text_map_propagator(|propagator| {
        propagator.inject_context(&cx, &mut HeaderMapCarrier(&mut headers));
    });
    headers
}
