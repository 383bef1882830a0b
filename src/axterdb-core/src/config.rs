use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Placeholder shown instead of the API key unless `show_keys` is set
pub const HIDDEN_KEY: &str = "[HIDDEN]";

#[derive(Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Logical database name the key must have access to
    pub name: String,
    pub key: String,
    /// Instance address as `ip:port`
    pub host: String,
    #[serde(default)]
    pub show_keys: bool,

    /// Per-request timeout; unbounded when absent
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

impl ClientConfig {
    pub fn new(name: impl Into<String>, key: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            host: host.into(),
            show_keys: false,
            request_timeout_ms: None,
        }
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// The key as it may appear in logs and error messages
    pub fn displayed_key(&self) -> &str {
        if self.show_keys {
            &self.key
        } else {
            HIDDEN_KEY
        }
    }

    /// Parse the address portion of `host` as an IP literal.
    ///
    /// Accepts `ip`, `ip:port` and `[ipv6]:port`.
    pub fn instance_ip(&self) -> Option<IpAddr> {
        let address = match self.host.strip_prefix('[') {
            Some(rest) => rest.split(']').next()?,
            None => self.host.split(':').next()?,
        };
        address.parse().ok()
    }

    pub fn route(&self, path: &str) -> String {
        format!("http://{}{}", self.host, path)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("name", &self.name)
            .field("key", &self.displayed_key())
            .field("host", &self.host)
            .field("show_keys", &self.show_keys)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_instance_ip() {
        let ok = ClientConfig::new("db", "k", "127.0.0.1:8000");
        assert_eq!(ok.instance_ip(), Some("127.0.0.1".parse().unwrap()));

        let bare = ClientConfig::new("db", "k", "10.0.0.7");
        assert!(bare.instance_ip().is_some());

        let v6 = ClientConfig::new("db", "k", "[::1]:8000");
        assert_eq!(v6.instance_ip(), Some("::1".parse().unwrap()));

        for host in ["localhost:8000", "db.example.com", "", "999.1.1.1:80"] {
            assert!(ClientConfig::new("db", "k", host).instance_ip().is_none(), "{host}");
        }
    }

    #[test]
    fn test_displayed_key_and_debug_redaction() {
        let mut config = ClientConfig::new("db", "secret-key", "127.0.0.1:1");
        assert_eq!(config.displayed_key(), HIDDEN_KEY);
        assert!(!format!("{:?}", config).contains("secret-key"));

        config.show_keys = true;
        assert_eq!(config.displayed_key(), "secret-key");
    }

    #[test]
    fn test_route() {
        let config = ClientConfig::new("db", "k", "127.0.0.1:8000");
        assert_eq!(config.route("/me"), "http://127.0.0.1:8000/me");
        assert_eq!(config.route(""), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_load_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name": "main", "key": "abc", "host": "127.0.0.1:8000"}}"#
        )
        .unwrap();

        let config = ClientConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.name, "main");
        assert!(!config.show_keys);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(ClientConfig::load("/nonexistent/axterdb.json").is_err());
    }
}
