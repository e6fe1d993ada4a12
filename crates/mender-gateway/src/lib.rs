//! # mender-gateway
//!
//! Bridges a NATS JetStream request stream to the Mender management API.
//!
//! ## Architecture
//!
//! ```text
//! JetStream (MenderUser)          Mender management API        Blob storage
//!   user.login.<id>      ─┐
//!   device.listDevice.*   │      ┌──────────────┐
//!   device.preauthorize…  ├────► │  Dispatcher  │ ───► HttpRelay ───► /api/management/...
//!   device.acceptDevice.* │      └──────┬───────┘
//!   device.rejectDevice.* │             │ upload
//!   device.uploadArtifact ┘             ▼
//!                               ArtifactUploader ◄──── BlobStore::open_read
//!                                       │ (bounded pipe, multipart)
//!                                       ▼
//!                               POST /deployments/artifacts
//!
//!   <operation>Response.<request_id>  ◄── DurablePublisher (PubAck), header StatusCode
//! ```
//!
//! Each message is acknowledged after its handler finishes, whether or not a
//! response was published. Parse, login, transport and blob failures publish
//! nothing; the caller times out.

pub mod blob;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod messages;
pub mod relay;
pub mod routes;
pub mod subjects;
pub mod token;
pub mod upload;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use blob::{AzureBlobStore, BlobStore, BlobStream};
pub use config::GatewayConfig;
pub use dispatcher::{Dispatcher, InboundMessage, Outcome, STATUS_CODE_HEADER};
pub use error::{AuthError, BlobError, GatewayError, ParseError, TransportError, UploadError};
pub use relay::{HttpRelay, RelayResult, build_client};
pub use routes::{Route, RouteTable};
pub use subjects::Operation;
pub use token::{BearerToken, TokenBroker};
pub use upload::ArtifactUploader;
