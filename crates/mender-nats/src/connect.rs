use std::time::Duration;

use async_nats::{Client, ConnectOptions, Event};
use tracing::{info, instrument, warn};

use crate::auth::{NatsAuth, NatsConfig};

#[derive(Debug)]
pub enum ConnectError {
    InvalidCredentials(std::io::Error),
    ConnectionFailed {
        servers: Vec<String>,
        error: async_nats::ConnectError,
    },
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredentials(e) => write!(f, "Failed to load credentials file: {}", e),
            Self::ConnectionFailed { servers, error } => {
                write!(f, "Failed to connect to NATS servers {:?}: {}", servers, error)
            }
        }
    }
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidCredentials(e) => Some(e),
            Self::ConnectionFailed { error, .. } => Some(error),
        }
    }
}

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

fn reconnect_delay(attempts: usize) -> Duration {
    let exp = u32::try_from(attempts).unwrap_or(u32::MAX);
    Duration::from_secs(MAX_RECONNECT_DELAY.as_secs().min(2u64.saturating_pow(exp)))
}

fn log_event(event: &Event) {
    match event {
        Event::Disconnected => warn!("NATS disconnected - will attempt reconnect"),
        Event::ServerError(err) => warn!(error = %err, "NATS server error"),
        Event::ClientError(err) => warn!(error = %err, "NATS client error"),
        Event::SlowConsumer(sid) => warn!(sid, "NATS slow consumer detected"),
        Event::LameDuckMode => warn!("NATS server entering lame duck mode"),
        other => info!(event = %other, "NATS connection event"),
    }
}

async fn options_for(auth: &NatsAuth) -> Result<ConnectOptions, ConnectError> {
    let opts = match auth {
        NatsAuth::Credentials(path) => {
            info!(path = %path.display(), "Using credentials file");
            ConnectOptions::with_credentials_file(path.clone())
                .await
                .map_err(|e| {
                    warn!(error = %e, path = %path.display(), "Failed to load credentials file");
                    ConnectError::InvalidCredentials(e)
                })?
        }
        NatsAuth::NKey(seed) => ConnectOptions::with_nkey(seed.clone()),
        NatsAuth::UserPassword { user, password } => {
            ConnectOptions::with_user_and_password(user.clone(), password.clone())
        }
        NatsAuth::Token(token) => ConnectOptions::with_token(token.clone()),
        NatsAuth::None => ConnectOptions::new(),
    };
    Ok(opts)
}

/// Connect to NATS with automatic reconnection and event logging.
#[instrument(name = "nats.connect", skip(config), fields(servers = ?config.servers, auth = %config.auth.description()))]
pub async fn connect(config: &NatsConfig) -> Result<Client, ConnectError> {
    let opts = options_for(&config.auth)
        .await?
        .name(config.client_name.clone())
        .retry_on_initial_connect()
        .connection_timeout(CONNECTION_TIMEOUT)
        .reconnect_delay_callback(reconnect_delay)
        .event_callback(|event| async move { log_event(&event) });

    match opts.connect(&config.servers).await {
        Ok(client) => {
            info!(name = %config.client_name, "Connected to NATS");
            Ok(client)
        }
        Err(error) => {
            warn!(error = %error, "Failed to connect to NATS");
            Err(ConnectError::ConnectionFailed {
                servers: config.servers.clone(),
                error,
            })
        }
    }
}
