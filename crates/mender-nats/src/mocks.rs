//! Test doubles for code that publishes through [`DurablePublisher`].
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! mender-nats = { path = "...", features = ["test-support"] }
//! ```

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
};

use async_nats::HeaderMap;
use bytes::Bytes;

use crate::publish::DurablePublisher;

#[derive(Debug, Clone)]
pub struct MockError(pub String);

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MockError {}

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub headers: HeaderMap,
    pub payload: Bytes,
}

impl PublishedMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }
}

/// Records every publish; can be told to fail the next `n` attempts.
#[derive(Clone, Default)]
pub struct MockPublisher {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    fail_count: Arc<AtomicU32>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_publish(&self) {
        self.fail_publish_count(1);
    }

    pub fn fail_publish_count(&self, n: u32) {
        self.fail_count.store(n, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.subject.clone())
            .collect()
    }
}

impl DurablePublisher for MockPublisher {
    type Error = MockError;

    async fn publish_durable(
        &self,
        subject: String,
        headers: HeaderMap,
        payload: Bytes,
    ) -> Result<(), MockError> {
        let should_fail = self
            .fail_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(MockError(format!("mock: publish to {subject} failed")));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            subject,
            headers,
            payload,
        });
        Ok(())
    }
}
