//! Resolved delivery targets: the local relay and the remote backend.

use bizevent_core::config::{AppConfig, RelayConfig};
use bizevent_core::types::random_decimal_token;
use bizevent_core::{BizEventError, BizEventResult};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

/// Byte widths of the decimal groups a fresh send key is rendered from.
const SEND_KEY_GROUPS: [usize; 4] = [3, 3, 3, 3];

/// Connection parameters of the local relay endpoint, plus the shared
/// secret that proves a relay request came from this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub send_key: String,
}

impl TransportConfig {
    /// Parse the relay URL and resolve the send key. Called once at
    /// startup; the result is shared for the life of the process.
    pub fn resolve(relay: &RelayConfig) -> BizEventResult<Self> {
        let url = Url::parse(&relay.url).map_err(|e| {
            BizEventError::Config(format!("invalid relay url '{}': {e}", relay.url))
        })?;
        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(BizEventError::Config(format!(
                "relay url '{}' must use http or https",
                relay.url
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| BizEventError::Config(format!("relay url '{}' has no host", relay.url)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| BizEventError::Config(format!("relay url '{}' has no port", relay.url)))?;
        let path = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let send_key = resolve_send_key(relay)?;

        info!(scheme = %scheme, host = %host, port = port, path = %path, "Relay target resolved");

        Ok(Self {
            scheme,
            host,
            port,
            path,
            send_key,
        })
    }

    /// Value of the `Host` header; the port is only spelled out when it is
    /// not the scheme's default.
    pub fn host_header(&self) -> String {
        let default_port = if self.scheme == "https" { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host_header(), self.path)
    }
}

/// Send key from configuration, else from the key file, else freshly
/// generated and written to the key file so later starts reuse it.
pub fn resolve_send_key(relay: &RelayConfig) -> BizEventResult<String> {
    if let Some(key) = relay.send_key.as_deref().map(str::trim) {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    let path = Path::new(&relay.send_key_file);
    if path.exists() {
        let stored = fs::read_to_string(path)?;
        let stored = stored.trim();
        if !stored.is_empty() {
            debug!(path = %path.display(), "Send key loaded from file");
            return Ok(stored.to_string());
        }
    }

    let key = random_decimal_token(&SEND_KEY_GROUPS);
    fs::write(path, &key)?;
    info!(path = %path.display(), "Generated new send key");
    Ok(key)
}

/// Where events go when a strategy talks to the backend directly.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    config: AppConfig,
}

impl RemoteEndpoint {
    pub fn from_config(config: &AppConfig) -> BizEventResult<Self> {
        if config.capture.api_key.trim().is_empty() {
            return Err(BizEventError::Config(
                "capture.api_key is required to deliver events to the backend".into(),
            ));
        }
        if config.capture.test_mode && config.capture.test_server_url_start.trim().is_empty() {
            return Err(BizEventError::Config(
                "capture.test_server_url_start is required in test mode".into(),
            ));
        }
        Ok(Self {
            config: config.clone(),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.config.capture.api_key
    }

    pub fn url_for(&self, correlation_id: &str) -> String {
        self.config.remote_event_url(correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_config(url: &str, dir: &tempfile::TempDir) -> RelayConfig {
        RelayConfig {
            url: url.into(),
            send_key: Some("fixed".into()),
            send_key_file: dir.path().join("send_key").display().to_string(),
            ..RelayConfig::default()
        }
    }

    #[test]
    fn test_resolve_fills_default_port() {
        let dir = tempfile::tempdir().unwrap();
        let target = TransportConfig::resolve(&relay_config("http://shop.local/bizevent/send", &dir))
            .unwrap();
        assert_eq!(target.port, 80);
        assert_eq!(target.host, "shop.local");
        assert_eq!(target.path, "/bizevent/send");
        assert_eq!(target.host_header(), "shop.local");
        assert_eq!(target.send_key, "fixed");

        let target =
            TransportConfig::resolve(&relay_config("https://shop.local/x", &dir)).unwrap();
        assert_eq!(target.port, 443);
    }

    #[test]
    fn test_resolve_keeps_explicit_port_in_host_header() {
        let dir = tempfile::tempdir().unwrap();
        let target =
            TransportConfig::resolve(&relay_config("http://127.0.0.1:8080/bizevent/send", &dir))
                .unwrap();
        assert_eq!(target.host_header(), "127.0.0.1:8080");
        assert_eq!(target.url(), "http://127.0.0.1:8080/bizevent/send");
    }

    #[test]
    fn test_resolve_rejects_bad_urls() {
        let dir = tempfile::tempdir().unwrap();
        assert!(TransportConfig::resolve(&relay_config("not a url", &dir)).is_err());
        assert!(TransportConfig::resolve(&relay_config("ftp://shop.local/x", &dir)).is_err());
    }

    #[test]
    fn test_send_key_generated_once_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut relay = relay_config("http://127.0.0.1/x", &dir);
        relay.send_key = None;

        let first = resolve_send_key(&relay).unwrap();
        assert!(!first.is_empty());
        assert!(first.chars().all(|c| c.is_ascii_digit()));

        let second = resolve_send_key(&relay).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_remote_endpoint_requires_api_key() {
        let mut config = AppConfig::default();
        assert!(RemoteEndpoint::from_config(&config).is_err());

        config.capture.api_key = "api-123".into();
        let endpoint = RemoteEndpoint::from_config(&config).unwrap();
        assert_eq!(endpoint.api_key(), "api-123");
        assert!(endpoint.url_for("77").ends_with("/plugin/77/v1-beta/magentoBizEvent"));
    }
}
