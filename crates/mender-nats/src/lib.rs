//! # mender-nats
//!
//! NATS infrastructure for the Mender gateway.
//!
//! This crate provides:
//! - Environment access behind [`ReadEnv`] so configuration is testable
//! - Connection configuration from the environment and [`connect`] with
//!   automatic reconnection
//! - [`DurablePublisher`], publishing that resolves once the broker holds the
//!   message (JetStream `PubAck`)
//! - OpenTelemetry trace context propagation into message headers
//! - A recording publisher for tests (with the `test-support` feature)
//!
//! ## Example
//!
//! ```rust,no_run
//! use mender_nats::{NatsConfig, SystemEnv, connect};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = NatsConfig::from_env(&SystemEnv);
//!     let client = connect(&config).await.expect("Failed to connect");
//!     let _jetstream = async_nats::jetstream::new(client);
//! }
//! ```

pub mod auth;
pub mod connect;
pub mod env;
pub mod publish;

#[cfg(any(test, feature = "test-support"))]
pub mod mocks;

pub use auth::{NatsAuth, NatsConfig};
pub use connect::{ConnectError, connect};
pub use env::{ReadEnv, SystemEnv};
pub use publish::{DurablePublisher, headers_with_trace_context};

#[cfg(any(test, feature = "test-support"))]
pub use env::InMemoryEnv;
#[cfg(any(test, feature = "test-support"))]
pub use mocks::{MockPublisher, PublishedMessage};
