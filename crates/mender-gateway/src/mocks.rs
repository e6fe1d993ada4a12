//! In-memory doubles for [`BlobStore`] and [`InboundMessage`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};

use crate::blob::{BlobStore, BlobStream};
use crate::dispatcher::InboundMessage;
use crate::error::BlobError;

#[derive(Clone)]
struct StoredBlob {
    chunks: Vec<Bytes>,
    failure: Option<String>,
    endless: bool,
}

/// Blobs keyed by `(container, name)`. Unknown blobs fail to open.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<(String, String), StoredBlob>>>,
    opened: Arc<AtomicUsize>,
    open_streams: Arc<AtomicUsize>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, container: &str, name: &str, data: impl Into<Bytes>) {
        self.insert_chunks(container, name, vec![data.into()]);
    }

    pub fn insert_chunks(&self, container: &str, name: &str, chunks: Vec<Bytes>) {
        self.store(
            container,
            name,
            StoredBlob {
                chunks,
                failure: None,
                endless: false,
            },
        );
    }

    /// Yields `chunks`, then never ends.
    pub fn insert_endless(&self, container: &str, name: &str, chunks: Vec<Bytes>) {
        self.store(
            container,
            name,
            StoredBlob {
                chunks,
                failure: None,
                endless: true,
            },
        );
    }

    /// Yields `chunks`, then fails with a read error carrying `reason`.
    pub fn insert_failing(&self, container: &str, name: &str, chunks: Vec<Bytes>, reason: &str) {
        self.store(
            container,
            name,
            StoredBlob {
                chunks,
                failure: Some(reason.to_string()),
                endless: false,
            },
        );
    }

    /// Number of successful `open_read` calls.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Streams handed out by `open_read` and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn store(&self, container: &str, name: &str, blob: StoredBlob) {
        self.blobs
            .lock()
            .unwrap()
            .insert((container.to_string(), name.to_string()), blob);
    }
}

impl BlobStore for MemoryBlobStore {
    async fn open_read(&self, container: &str, name: &str) -> Result<BlobStream, BlobError> {
        let blob = self
            .blobs
            .lock()
            .unwrap()
            .get(&(container.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| BlobError::Open {
                container: container.to_string(),
                name: name.to_string(),
                reason: "BlobNotFound".to_string(),
            })?;
        self.opened.fetch_add(1, Ordering::SeqCst);

        let chunks = stream::iter(blob.chunks.into_iter().map(Ok));
        let failure = stream::iter(blob.failure.map(|reason| Err(BlobError::Read(reason))));
        let inner = if blob.endless {
            chunks
                .chain(failure)
                .chain(stream::pending::<Result<Bytes, BlobError>>())
                .boxed()
        } else {
            chunks.chain(failure).boxed()
        };

        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(TrackedStream {
            inner,
            open_streams: Arc::clone(&self.open_streams),
        }
        .boxed())
    }
}

/// Decrements the open-stream count when dropped.
struct TrackedStream {
    inner: BlobStream,
    open_streams: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = Result<Bytes, BlobError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An inbound message that records whether it was acknowledged.
#[derive(Debug, Clone)]
pub struct MockInbound {
    subject: String,
    payload: Bytes,
    acked: Arc<AtomicBool>,
}

impl MockInbound {
    pub fn new(subject: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            acked: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_acked(&self) -> bool {
        self.acked.load(Ordering::SeqCst)
    }
}

impl InboundMessage for MockInbound {
    type AckError = std::convert::Infallible;

    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<(), Self::AckError> {
        self.acked.store(true, Ordering::SeqCst);
        Ok(())
    }
}
