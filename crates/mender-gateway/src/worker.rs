//! JetStream pull-consumer worker.
//!
//! Binds the durable consumer on the request stream, filtered to the six
//! inbound subject patterns, and feeds each message through the
//! [`Dispatcher`] with at most `max_in_flight` handlers running at once.
//! Runs until the message stream ends.

use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_nats::jetstream::consumer::{AckPolicy, Consumer, DeliverPolicy};
use futures::StreamExt;

use crate::blob::BlobStore;
use crate::dispatcher::Dispatcher;
use crate::subjects::consumer_filters;
use mender_nats::DurablePublisher;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("JetStream error: {0}")]
    JetStream(String),
}

/// Durable pull consumer definition: explicit acks, one filter per operation.
pub fn consumer_config(consumer_name: &str) -> pull::Config {
    pull::Config {
        durable_name: Some(consumer_name.to_string()),
        ack_policy: AckPolicy::Explicit,
        deliver_policy: DeliverPolicy::All,
        filter_subjects: consumer_filters(),
        ..Default::default()
    }
}

pub async fn run<P, B>(
    jetstream: &jetstream::Context,
    dispatcher: &Dispatcher<P, B>,
    stream_name: &str,
    consumer_name: &str,
    max_in_flight: usize,
) -> Result<(), WorkerError>
where
    P: DurablePublisher,
    B: BlobStore,
{
    let stream = jetstream
        .get_stream(stream_name)
        .await
        .map_err(|e| WorkerError::JetStream(e.to_string()))?;

    let consumer: Consumer<pull::Config> = stream
        .get_or_create_consumer(consumer_name, consumer_config(consumer_name))
        .await
        .map_err(|e| WorkerError::JetStream(e.to_string()))?;

    let messages = consumer
        .messages()
        .await
        .map_err(|e| WorkerError::JetStream(e.to_string()))?;

    tracing::info!(
        stream = %stream_name,
        consumer = %consumer_name,
        max_in_flight,
        "Worker started, pulling messages"
    );

    messages
        .for_each_concurrent(max_in_flight, |msg_result| async move {
            match msg_result {
                Ok(msg) => {
                    dispatcher.process(msg).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Error receiving JetStream message");
                }
            }
        })
        .await;

    tracing::info!(consumer = %consumer_name, "Message stream ended");
    Ok(())
}
