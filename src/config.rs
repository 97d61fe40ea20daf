use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub messaging: MessagingConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "DUET_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "DUET_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management listener (health probes)
    #[arg(long, env = "DUET_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for open connections to drain on shutdown
    #[arg(long, env = "DUET_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Upper bound on a single HTTP request, websocket upgrades excluded
    #[arg(long, env = "DUET_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            mgmt_port: 9090,
            shutdown_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Postgres connection URL. Without it conversations are kept in memory.
    #[arg(long = "database-url", env = "DUET_DATABASE_URL")]
    pub url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, env = "DUET_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum pooled connections
    #[arg(long, env = "DUET_DB_MIN_CONNECTIONS", default_value_t = 1)]
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long, env = "DUET_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Timeout for the readiness probe query
    #[arg(long, env = "DUET_DB_HEALTH_TIMEOUT_MS", default_value_t = 2000)]
    pub health_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, max_connections: 20, min_connections: 1, acquire_timeout_secs: 5, health_timeout_ms: 2000 }
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct AuthConfig {
    /// Secret used to verify identity tokens. Without it the upstream identity
    /// provider is trusted to supply the user id directly.
    #[arg(long, env = "DUET_JWT_SECRET")]
    pub jwt_secret: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct MessagingConfig {
    /// Maximum size of a message body in bytes
    #[arg(long, env = "DUET_MAX_CONTENT_BYTES", default_value_t = 4096)]
    pub max_content_bytes: usize,

    /// Attempts made to converge on a single conversation under concurrent first contact
    #[arg(long, env = "DUET_CONVERSATION_CREATE_ATTEMPTS", default_value_t = 3)]
    pub conversation_create_attempts: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self { max_content_bytes: 4096, conversation_create_attempts: 3 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the per-connection outbound event buffer
    #[arg(long, env = "DUET_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 64)]
    pub outbound_buffer_size: usize,

    /// Seconds a connection may stay unauthenticated before it is closed
    #[arg(long, env = "DUET_WS_AUTH_TIMEOUT_SECS", default_value_t = 10)]
    pub auth_timeout_secs: u64,

    /// Interval between server heartbeat pings
    #[arg(long, env = "DUET_WS_PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,

    /// Grace period after a ping before a silent connection is closed
    #[arg(long, env = "DUET_WS_PING_TIMEOUT_SECS", default_value_t = 10)]
    pub ping_timeout_secs: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { outbound_buffer_size: 64, auth_timeout_secs: 10, ping_interval_secs: 30, ping_timeout_secs: 10 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "DUET_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint for traces and metrics
    #[arg(long, env = "DUET_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
