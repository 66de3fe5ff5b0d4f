use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BizEventError, BizEventResult};

/// Production host of the analytics backend.
pub const DEFAULT_BACKEND_HOST: &str = "https://app.cartdefender.com";

/// Path prefix of the plugin business-event API.
pub const BIZ_API_PATH_START: &str = "/plugin";

/// Version segment of the plugin business-event API.
pub const BIZ_API_VERSION: &str = "v1-beta";

/// Trailing path segment of the plugin business-event API.
pub const BIZ_API_PATH_END: &str = "/magentoBizEvent";

/// Path of the browser-side sensor script on the backend host.
pub const SENSOR_SCRIPT_PATH: &str = "/script/cartdefender.js";

/// Root application configuration. Loaded from environment variables
/// with the prefix `BIZEVENT__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub subprocess: SubprocessConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Which delivery mechanism carries events off the request path.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Fire-and-forget POST to the local relay over a raw TCP socket.
    #[default]
    AsyncSocket,
    /// Detached HTTP client process posting straight to the backend.
    Subprocess,
    /// Blocking HTTP POST; waits for the backend's answer.
    SyncHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::AsyncSocket => "async_socket",
            TransportKind::Subprocess => "subprocess",
            TransportKind::SyncHttp => "sync_http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = BizEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "async_socket" => Ok(TransportKind::AsyncSocket),
            "subprocess" => Ok(TransportKind::Subprocess),
            "sync_http" => Ok(TransportKind::SyncHttp),
            other => Err(BizEventError::Config(format!(
                "unknown transport '{other}' (expected async_socket, subprocess or sync_http)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    /// Routes events to `test_server_url_start` and raises log verbosity.
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub test_server_url_start: String,
    /// Use `test_server_url_start` verbatim, without the API path.
    #[serde(default)]
    pub use_raw_test_url: bool,
    #[serde(default)]
    pub transport: TransportKind,
    #[serde(default = "default_heartbeat_threshold_secs")]
    pub heartbeat_threshold_secs: i64,
    #[serde(default = "default_app_software_name")]
    pub app_software_name: String,
    #[serde(default = "default_app_software_version")]
    pub app_software_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// URL of the local relay endpoint the async socket transport posts to.
    #[serde(default = "default_relay_url")]
    pub url: String,
    #[serde(default = "default_relay_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Zero-progress write attempts tolerated before the rest of a request
    /// is abandoned.
    #[serde(default = "default_max_zero_writes")]
    pub max_zero_writes: u32,
    #[serde(default)]
    pub send_key: Option<String>,
    #[serde(default = "default_send_key_file")]
    pub send_key_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_host")]
    pub host: String,
    #[serde(default = "default_backend_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubprocessConfig {
    #[serde(default = "default_subprocess_program")]
    pub program: String,
    #[serde(default = "default_subprocess_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Largest relay request body read; larger ones are dropped.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "relay-01".to_string()
}
fn default_heartbeat_threshold_secs() -> i64 {
    7200
}
fn default_app_software_name() -> String {
    "Magento".to_string()
}
fn default_app_software_version() -> String {
    "1.9".to_string()
}
fn default_relay_url() -> String {
    "http://127.0.0.1:8080/bizevent/send".to_string()
}
fn default_relay_connect_timeout_ms() -> u64 {
    200
}
fn default_max_zero_writes() -> u32 {
    3
}
fn default_send_key_file() -> String {
    "bizevent.send_key".to_string()
}
fn default_backend_host() -> String {
    DEFAULT_BACKEND_HOST.to_string()
}
fn default_backend_timeout_ms() -> u64 {
    10_000
}
fn default_subprocess_program() -> String {
    "curl".to_string()
}
fn default_subprocess_connect_timeout_secs() -> u64 {
    5
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            test_mode: false,
            test_server_url_start: String::new(),
            use_raw_test_url: false,
            transport: TransportKind::default(),
            heartbeat_threshold_secs: default_heartbeat_threshold_secs(),
            app_software_name: default_app_software_name(),
            app_software_version: default_app_software_version(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: default_relay_url(),
            connect_timeout_ms: default_relay_connect_timeout_ms(),
            max_zero_writes: default_max_zero_writes(),
            send_key: None,
            send_key_file: default_send_key_file(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            request_timeout_ms: default_backend_timeout_ms(),
        }
    }
}

impl Default for SubprocessConfig {
    fn default() -> Self {
        Self {
            program: default_subprocess_program(),
            connect_timeout_secs: default_subprocess_connect_timeout_secs(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            capture: CaptureConfig::default(),
            relay: RelayConfig::default(),
            backend: BackendConfig::default(),
            subprocess: SubprocessConfig::default(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Host serving the backend API and the sensor script: the test server
    /// in test mode, production otherwise.
    pub fn backend_host<'a>(&'a self, backend: &'a BackendConfig) -> &'a str {
        if self.test_mode {
            &self.test_server_url_start
        } else {
            &backend.host
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables. Absent keys take
    /// their defaults; a present but malformed value is an error.
    pub fn load() -> BizEventResult<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit variable map instead of the process
    /// environment.
    pub fn load_from(vars: Option<config::Map<String, String>>) -> BizEventResult<Self> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("BIZEVENT")
                .separator("__")
                .try_parsing(true)
                .source(vars),
        );

        builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| BizEventError::Config(e.to_string()))
    }

    /// URL the backend accepts business events on for one correlation id.
    pub fn remote_event_url(&self, correlation_id: &str) -> String {
        let path = format!(
            "{BIZ_API_PATH_START}/{correlation_id}/{BIZ_API_VERSION}{BIZ_API_PATH_END}"
        );
        if self.capture.test_mode {
            if self.capture.use_raw_test_url {
                self.capture.test_server_url_start.clone()
            } else {
                format!("{}{}", self.capture.test_server_url_start, path)
            }
        } else {
            format!("{}{}", self.backend.host, path)
        }
    }

    /// URL of the browser-side sensor script.
    pub fn sensor_script_url(&self) -> String {
        format!(
            "{}{}",
            self.capture.backend_host(&self.backend),
            SENSOR_SCRIPT_PATH
        )
    }
}
