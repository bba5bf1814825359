//! Multiplexer configuration: the `Config`/`ConfigBuilder` pair plus
//! optional TOML loading (spec §6 "Configuration options").
//!
//! TOML is an optional convenience, not the only entry point — most
//! embedders will build a `Config` directly via `ConfigBuilder`. The
//! `RawConfig`-with-`Option`-fields pattern below follows the same shape as
//! the forwarder's own config loader, just applied to a single flat table
//! instead of nested sections.

use serde::Deserialize;
use std::time::Duration;

/// Which RESP protocol version to negotiate at handshake (spec §4.D, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolPreference {
    Resp2,
    #[default]
    Auto,
    Resp3,
}

/// Backlog admission policy while a bridge is not yet `ConnectedEstablished`
/// (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BacklogPolicy {
    #[default]
    Default,
    FailFast,
}

/// Reconnect backoff shape (spec §6 `reconnectRetryPolicy`; supplemented in
/// `SPEC_FULL.md` §C.1 since the spec only names the hook).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconnectRetryPolicy {
    Linear { step: Duration, cap: Duration },
    Exponential { base: Duration, cap: Duration },
    Fixed(Duration),
}

impl Default for ReconnectRetryPolicy {
    fn default() -> Self {
        ReconnectRetryPolicy::Exponential {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(10),
        }
    }
}

impl ReconnectRetryPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based). Jitter is
    /// applied by the caller, which has access to a shared RNG; this method
    /// stays deterministic so it's trivially testable.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectRetryPolicy::Linear { step, cap } => (step * attempt).min(cap),
            ReconnectRetryPolicy::Exponential { base, cap } => {
                let factor = 1u32.checked_shl(attempt.min(20)).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(cap)
            }
            ReconnectRetryPolicy::Fixed(d) => d,
        }
    }
}

/// Fully-resolved configuration (spec §6).
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: Vec<(String, u16)>,
    pub protocol: ProtocolPreference,
    pub user: Option<String>,
    pub password: Option<String>,
    pub client_name: Option<String>,
    pub default_database: u8,
    pub abort_connect: bool,
    pub allow_admin: bool,
    pub connect_timeout: Duration,
    pub sync_timeout: Duration,
    pub async_timeout: Duration,
    pub keep_alive: Duration,
    pub ssl: bool,
    pub ssl_host: Option<String>,
    pub check_certificate_revocation: bool,
    pub tiebreaker: String,
    pub config_channel: String,
    pub service_name: Option<String>,
    pub connect_retry: u32,
    pub reconnect_retry_policy: ReconnectRetryPolicy,
    pub backlog_policy: BacklogPolicy,
    pub include_detail_in_exceptions: bool,
    pub heartbeat_interval: Duration,
    pub config_check_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            protocol: ProtocolPreference::Auto,
            user: None,
            password: None,
            client_name: None,
            default_database: 0,
            abort_connect: true,
            allow_admin: false,
            connect_timeout: Duration::from_millis(5_000),
            sync_timeout: Duration::from_millis(5_000),
            async_timeout: Duration::from_millis(5_000),
            keep_alive: Duration::from_secs(60),
            ssl: false,
            ssl_host: None,
            check_certificate_revocation: true,
            tiebreaker: "__Booksleeve_TieBreak".to_owned(),
            config_channel: "__Booksleeve_MasterChanged".to_owned(),
            service_name: None,
            connect_retry: 3,
            reconnect_retry_policy: ReconnectRetryPolicy::default(),
            backlog_policy: BacklogPolicy::Default,
            include_detail_in_exceptions: true,
            heartbeat_interval: Duration::from_millis(1_000),
            config_check_interval: Duration::from_secs(60),
        }
    }
}

/// Builder over [`Config`], mirroring the forwarder's practice of keeping
/// construction ergonomic while the underlying struct stays plain data.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.endpoints.push((host.into(), port));
        self
    }

    pub fn protocol(mut self, p: ProtocolPreference) -> Self {
        self.config.protocol = p;
        self
    }

    pub fn credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.config.user = user;
        self.config.password = password;
        self
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = Some(name.into());
        self
    }

    pub fn default_database(mut self, db: u8) -> Self {
        self.config.default_database = db;
        self
    }

    pub fn allow_admin(mut self, allow: bool) -> Self {
        self.config.allow_admin = allow;
        self
    }

    pub fn ssl(mut self, enabled: bool) -> Self {
        self.config.ssl = enabled;
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = Some(name.into());
        self
    }

    pub fn reconnect_retry_policy(mut self, policy: ReconnectRetryPolicy) -> Self {
        self.config.reconnect_retry_policy = policy;
        self
    }

    pub fn include_detail_in_exceptions(mut self, include: bool) -> Self {
        self.config.include_detail_in_exceptions = include;
        self
    }

    /// Finalize, rejecting configurations that can never connect
    /// (spec §7 `ConfigurationError`, "surfaced at Connect" — but an empty
    /// endpoint list is caught here since no network attempt could help).
    pub fn build(self) -> Result<Config, ConfigError> {
        if self.config.endpoints.is_empty() {
            return Err(ConfigError::MissingField("endpoints".to_owned()));
        }
        if self.config.default_database > 15 {
            return Err(ConfigError::InvalidValue(format!(
                "defaultDatabase must be 0..15, got {}",
                self.config.default_database
            )));
        }
        Ok(self.config)
    }
}

// ---------------------------------------------------------------------------
// TOML loading
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    endpoints: Option<String>,
    protocol: Option<String>,
    user: Option<String>,
    password: Option<String>,
    client_name: Option<String>,
    default_database: Option<u8>,
    abort_connect: Option<bool>,
    allow_admin: Option<bool>,
    connect_timeout_ms: Option<u64>,
    sync_timeout_ms: Option<u64>,
    async_timeout_ms: Option<u64>,
    keep_alive_secs: Option<u64>,
    ssl: Option<bool>,
    ssl_host: Option<String>,
    check_certificate_revocation: Option<bool>,
    tiebreaker: Option<String>,
    config_channel: Option<String>,
    service_name: Option<String>,
    connect_retry: Option<u32>,
    backlog_policy: Option<String>,
    include_detail_in_exceptions: Option<bool>,
    heartbeat_interval_ms: Option<u64>,
    config_check_seconds: Option<u64>,
}

/// Parse a `Config` from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = Config::default();

    let endpoints_field = raw
        .endpoints
        .ok_or_else(|| ConfigError::MissingField("endpoints".to_owned()))?;
    let endpoints = parse_endpoints(&endpoints_field)?;

    let protocol = match raw.protocol.as_deref() {
        Some("Resp2") => ProtocolPreference::Resp2,
        Some("Resp3") => ProtocolPreference::Resp3,
        Some("Auto") | None => ProtocolPreference::Auto,
        Some(other) => {
            return Err(ConfigError::InvalidValue(format!(
                "protocol must be Resp2|Resp3|Auto, got '{other}'"
            )))
        }
    };

    let backlog_policy = match raw.backlog_policy.as_deref() {
        Some("Default") | None => BacklogPolicy::Default,
        Some("FailFast") => BacklogPolicy::FailFast,
        Some(other) => {
            return Err(ConfigError::InvalidValue(format!(
                "backlogPolicy must be Default|FailFast, got '{other}'"
            )))
        }
    };

    let default_database = raw.default_database.unwrap_or(defaults.default_database);
    if default_database > 15 {
        return Err(ConfigError::InvalidValue(format!(
            "defaultDatabase must be 0..15, got {default_database}"
        )));
    }

    Ok(Config {
        endpoints,
        protocol,
        user: raw.user,
        password: raw.password,
        client_name: raw.client_name,
        default_database,
        abort_connect: raw.abort_connect.unwrap_or(defaults.abort_connect),
        allow_admin: raw.allow_admin.unwrap_or(defaults.allow_admin),
        connect_timeout: raw
            .connect_timeout_ms
            .map_or(defaults.connect_timeout, Duration::from_millis),
        sync_timeout: raw
            .sync_timeout_ms
            .map_or(defaults.sync_timeout, Duration::from_millis),
        async_timeout: raw
            .async_timeout_ms
            .map_or(defaults.async_timeout, Duration::from_millis),
        keep_alive: raw.keep_alive_secs.map_or(defaults.keep_alive, Duration::from_secs),
        ssl: raw.ssl.unwrap_or(defaults.ssl),
        ssl_host: raw.ssl_host,
        check_certificate_revocation: raw
            .check_certificate_revocation
            .unwrap_or(defaults.check_certificate_revocation),
        tiebreaker: raw.tiebreaker.unwrap_or(defaults.tiebreaker),
        config_channel: raw.config_channel.unwrap_or(defaults.config_channel),
        service_name: raw.service_name,
        connect_retry: raw.connect_retry.unwrap_or(defaults.connect_retry),
        reconnect_retry_policy: defaults.reconnect_retry_policy,
        backlog_policy,
        include_detail_in_exceptions: raw
            .include_detail_in_exceptions
            .unwrap_or(defaults.include_detail_in_exceptions),
        heartbeat_interval: raw
            .heartbeat_interval_ms
            .map_or(defaults.heartbeat_interval, Duration::from_millis),
        config_check_interval: raw
            .config_check_seconds
            .map_or(defaults.config_check_interval, Duration::from_secs),
    })
}

/// Load a `Config` from a TOML file on disk.
pub fn load_config_from_path(path: &std::path::Path) -> Result<Config, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

fn parse_endpoints(field: &str) -> Result<Vec<(String, u16)>, ConfigError> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let (host, port) = entry
                .rsplit_once(':')
                .ok_or_else(|| ConfigError::InvalidValue(format!("endpoint '{entry}' missing port")))?;
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("endpoint '{entry}' has invalid port")))?;
            Ok((host.to_owned(), port))
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
