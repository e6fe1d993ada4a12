//! Streams a blob into a multipart artifact upload.
//!
//! The blob is never held in memory as a whole. An encoder task copies the
//! blob chunks into a bounded channel whose receiving end is the file part of
//! the request form. When the channel is full the encoder waits, so at most
//! `pipe_capacity` chunks sit between the blob download and the upload.

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::blob::{BlobStore, BlobStream};
use crate::error::{BlobError, TransportError, UploadError};
use crate::relay::{HttpRelay, RelayResult};
use crate::routes::{Route, RouteTable};

pub const DEFAULT_PIPE_CAPACITY: usize = 8;

/// How long a failed request waits for the encoder to report why.
const ENCODER_GRACE: Duration = Duration::from_millis(500);

const DESCRIPTION_FIELD: &str = "description";
const ARTIFACT_FIELD: &str = "artifact";
const ARTIFACT_MIME: &str = "application/octet-stream";

/// Why the encoder stopped before the blob was fully copied.
#[derive(Debug)]
enum PipeError {
    /// The blob stream failed.
    Source(BlobError),
    /// The request body was dropped by the HTTP client.
    BodyClosed,
}

/// Aborts the encoder when the upload future is dropped.
struct EncoderTask(JoinHandle<Result<u64, PipeError>>);

impl Drop for EncoderTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

type PipeItem = Result<Bytes, BlobError>;

fn spawn_pipe(source: BlobStream, capacity: usize) -> (ReceiverStream<PipeItem>, EncoderTask) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(encode(source, tx));
    (ReceiverStream::new(rx), EncoderTask(task))
}

/// Copy blob chunks in order. A blob error is forwarded into the pipe so the
/// request body fails, then returned.
async fn encode(mut source: BlobStream, tx: mpsc::Sender<PipeItem>) -> Result<u64, PipeError> {
    let mut copied: u64 = 0;
    while let Some(chunk) = source.next().await {
        match chunk {
            Ok(bytes) if bytes.is_empty() => {}
            Ok(bytes) => {
                copied += bytes.len() as u64;
                tx.send(Ok(bytes))
                    .await
                    .map_err(|_| PipeError::BodyClosed)?;
            }
            Err(e) => {
                let _ = tx.send(Err(BlobError::Read(e.to_string()))).await;
                return Err(PipeError::Source(e));
            }
        }
    }
    Ok(copied)
}

/// Moves artifacts from a [`BlobStore`] to the deployments API.
#[derive(Clone)]
pub struct ArtifactUploader<B> {
    store: B,
    relay: HttpRelay,
    scheme: String,
    pipe_capacity: usize,
}

impl<B: BlobStore> ArtifactUploader<B> {
    pub fn new(store: B, relay: HttpRelay, scheme: impl Into<String>) -> Self {
        Self {
            store,
            relay,
            scheme: scheme.into(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }

    pub fn with_pipe_capacity(mut self, capacity: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self
    }

    pub fn pipe_capacity(&self) -> usize {
        self.pipe_capacity
    }

    /// Upload `container/blob_name` as a new artifact. Succeeds only on 201.
    pub async fn upload(
        &self,
        routes: &RouteTable,
        container: &str,
        blob_name: &str,
        description: &str,
        domain: &str,
        token: &str,
    ) -> Result<RelayResult, UploadError> {
        let source = self
            .store
            .open_read(container, blob_name)
            .await
            .map_err(UploadError::BlobOpen)?;

        let (body, mut encoder) = spawn_pipe(source, self.pipe_capacity);
        let artifact = Part::stream(Body::wrap_stream(body))
            .file_name(blob_name.to_string())
            .mime_str(ARTIFACT_MIME)
            .map_err(TransportError::Build)?;
        let form = Form::new()
            .text(DESCRIPTION_FIELD, description.to_string())
            .part(ARTIFACT_FIELD, artifact);

        let url = routes.url(&self.scheme, domain, Route::ArtifactUpload, &[]);
        let builder = self
            .relay
            .client()
            .post(url)
            .bearer_auth(token)
            .multipart(form);

        let result = match self.relay.execute(builder).await {
            Ok(result) => result,
            Err(transport) => {
                // A blob failure surfaces to the client as a body error.
                if let Ok(Ok(Err(PipeError::Source(blob)))) =
                    tokio::time::timeout(ENCODER_GRACE, &mut encoder.0).await
                {
                    return Err(UploadError::BlobRead(blob));
                }
                return Err(UploadError::Transport(transport));
            }
        };
        drop(encoder);

        if result.status != 201 {
            return Err(UploadError::UnexpectedStatus {
                status: result.status,
                body: result.body_text(),
            });
        }

        tracing::info!(container, blob_name, domain, "Artifact uploaded");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;

    use super::*;
    use crate::mocks::MemoryBlobStore;
    use crate::relay::build_client;

    fn uploader(store: MemoryBlobStore) -> ArtifactUploader<MemoryBlobStore> {
        ArtifactUploader::new(store, HttpRelay::new(build_client(false).unwrap()), "http")
    }

    #[tokio::test]
    async fn producer_never_runs_more_than_capacity_ahead() {
        const CAPACITY: usize = 4;
        const CHUNKS: usize = 256;
        const CHUNK_SIZE: usize = 16 * 1024;

        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let source = stream::iter(0..CHUNKS)
            .map(move |i| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Bytes::from(vec![(i % 251) as u8; CHUNK_SIZE]))
            })
            .boxed();

        let (mut body, mut encoder) = spawn_pipe(source, CAPACITY);

        let mut consumed = 0;
        let mut total = 0;
        let mut max_lead = 0;
        while let Some(item) = body.next().await {
            total += item.unwrap().len();
            consumed += 1;
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            let lead = produced.load(Ordering::SeqCst).saturating_sub(consumed);
            max_lead = max_lead.max(lead);
            assert!(lead <= CAPACITY + 1, "producer ran {lead} chunks ahead");
        }

        let copied = (&mut encoder.0).await.unwrap().unwrap();
        assert_eq!(copied, (CHUNKS * CHUNK_SIZE) as u64);
        assert_eq!(total, CHUNKS * CHUNK_SIZE);
        assert!(max_lead <= CAPACITY + 1);
    }

    #[tokio::test]
    async fn blob_error_is_forwarded_into_the_pipe() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"part")),
            Err(BlobError::Read("connection reset".into())),
        ])
        .boxed();
        let (body, mut encoder) = spawn_pipe(source, 2);

        let items: Vec<PipeItem> = body.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
        assert!(matches!(
            (&mut encoder.0).await.unwrap(),
            Err(PipeError::Source(BlobError::Read(_)))
        ));
    }

    #[tokio::test]
    async fn dropped_body_stops_the_encoder_as_body_closed() {
        let source = stream::iter((0..64).map(|_| Ok(Bytes::from_static(b"chunk")))).boxed();
        let (body, mut encoder) = spawn_pipe(source, 2);
        drop(body);

        assert!(matches!(
            (&mut encoder.0).await.unwrap(),
            Err(PipeError::BodyClosed)
        ));
    }

    #[tokio::test]
    async fn uploads_multipart_body_and_accepts_201() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/api/management/v1/deployments/artifacts")
                    .header("authorization", "Bearer tok")
                    .header_exists("content-type")
                    .body_includes("name=\"description\"\r\n\r\nrelease 3.1\r\n")
                    .body_includes("name=\"artifact\"; filename=\"core.mender\"")
                    .body_includes("application/octet-stream")
                    .body_includes("first-second-third");
                then.status(201).body(r#"{"id":"artifact-1"}"#);
            })
            .await;

        let store = MemoryBlobStore::new();
        store.insert_chunks(
            "artifacts",
            "core.mender",
            vec![
                Bytes::from_static(b"first-"),
                Bytes::from_static(b"second-"),
                Bytes::from_static(b"third"),
            ],
        );

        let result = uploader(store)
            .with_pipe_capacity(1)
            .upload(
                &RouteTable::management(),
                "artifacts",
                "core.mender",
                "release 3.1",
                &server.address().to_string(),
                "tok",
            )
            .await
            .unwrap();

        assert_eq!(result.status, 201);
        assert_eq!(result.body_text(), r#"{"id":"artifact-1"}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn repeated_upload_is_sent_again() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.path("/api/management/v1/deployments/artifacts");
                then.status(201);
            })
            .await;
        let store = MemoryBlobStore::new();
        store.insert("artifacts", "a.mender", "bytes");
        let uploader = uploader(store.clone());

        for _ in 0..2 {
            uploader
                .upload(
                    &RouteTable::management(),
                    "artifacts",
                    "a.mender",
                    "",
                    &server.address().to_string(),
                    "tok",
                )
                .await
                .unwrap();
        }

        assert_eq!(mock.hits_async().await, 2);
        assert_eq!(store.opened(), 2);
    }

    #[tokio::test]
    async fn non_201_status_is_unexpected() {
        for status in [200, 403] {
            let server = httpmock::MockServer::start_async().await;
            server
                .mock_async(|when, then| {
                    when.any_request();
                    then.status(status).body("nope");
                })
                .await;

            let store = MemoryBlobStore::new();
            store.insert("artifacts", "a.mender", "bytes");

            let err = uploader(store)
                .upload(
                    &RouteTable::management(),
                    "artifacts",
                    "a.mender",
                    "",
                    &server.address().to_string(),
                    "tok",
                )
                .await
                .unwrap_err();

            match err {
                UploadError::UnexpectedStatus { status: got, body } => {
                    assert_eq!(got, status);
                    assert_eq!(body, "nope");
                }
                other => panic!("expected unexpected status, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn missing_blob_fails_before_any_request() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.any_request();
                then.status(201);
            })
            .await;

        let err = uploader(MemoryBlobStore::new())
            .upload(
                &RouteTable::management(),
                "artifacts",
                "missing.mender",
                "",
                &server.address().to_string(),
                "tok",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::BlobOpen(BlobError::Open { .. })));
        assert_eq!(mock.hits_async().await, 0);
    }

    #[tokio::test]
    async fn blob_read_failure_aborts_the_upload() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.any_request();
                then.status(201);
            })
            .await;

        let store = MemoryBlobStore::new();
        store.insert_failing(
            "artifacts",
            "broken.mender",
            vec![Bytes::from_static(b"partial")],
            "connection reset by peer",
        );

        let err = uploader(store)
            .upload(
                &RouteTable::management(),
                "artifacts",
                "broken.mender",
                "",
                &server.address().to_string(),
                "tok",
            )
            .await
            .unwrap_err();

        match err {
            UploadError::BlobRead(BlobError::Read(reason)) => {
                assert!(reason.contains("connection reset by peer"));
            }
            other => panic!("expected blob read failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn line_breaks_in_blob_name_do_not_inject_part_headers() {
        let server = httpmock::MockServer::start_async().await;
        let injected = server
            .mock_async(|when, then| {
                when.body_includes("\r\nX-Injected: yes");
                then.status(201);
            })
            .await;

        let name = "core.mender\"\r\nX-Injected: yes\r\n";
        let store = MemoryBlobStore::new();
        store.insert("artifacts", name, "bytes");

        let err = uploader(store)
            .upload(
                &RouteTable::management(),
                "artifacts",
                name,
                "",
                &server.address().to_string(),
                "tok",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::UnexpectedStatus { status: 404, .. }));
        assert_eq!(injected.hits_async().await, 0);
    }

    /// An address nothing listens on.
    fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_transport_failure() {
        let store = MemoryBlobStore::new();
        store.insert_chunks(
            "artifacts",
            "big.mender",
            (0..64).map(|_| Bytes::from_static(b"chunk")).collect(),
        );

        let err = uploader(store)
            .with_pipe_capacity(2)
            .upload(
                &RouteTable::management(),
                "artifacts",
                "big.mender",
                "",
                &closed_port(),
                "tok",
            )
            .await
            .unwrap_err();

        match err {
            UploadError::Transport(TransportError::Connect(_)) => {}
            other => panic!("expected transport failure, got {other:?}"),
        }
    }
}
