//! Runner configuration from `HASS_*` environment variables

use std::env;

use ha_client::ConnectOptions;

use crate::error::{ConfigError, ConfigResult};

pub const ENV_URL: &str = "HASS_URL";
pub const ENV_HOST: &str = "HASS_HOST";
pub const ENV_PORT: &str = "HASS_PORT";
pub const ENV_PATH: &str = "HASS_PATH";
pub const ENV_SECURE: &str = "HASS_SECURE";
pub const ENV_TOKEN: &str = "HASS_TOKEN";

/// Everything the runner needs to reach the hub
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub connect: ConnectOptions,
}

impl RunnerConfig {
    /// Load from the process environment
    ///
    /// Unset variables fall back to the client defaults. Empty values count
    /// as unset.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key/value source
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut connect = ConnectOptions::new();

        if let Some(host) = get(ENV_HOST) {
            connect = connect.host(host);
        }
        if let Some(port) = get(ENV_PORT) {
            let port = port.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: ENV_PORT.to_string(),
                reason: format!("'{}' is not a port number: {}", port, e),
            })?;
            connect = connect.port(port);
        }
        if let Some(path) = get(ENV_PATH) {
            connect = connect.path(path);
        }
        if let Some(secure) = get(ENV_SECURE) {
            connect = connect.secure(parse_bool(ENV_SECURE, &secure)?);
        }
        if let Some(url) = get(ENV_URL) {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::InvalidValue {
                    key: ENV_URL.to_string(),
                    reason: format!("'{}' must start with ws:// or wss://", url),
                });
            }
            connect = connect.url(url);
        }
        if let Some(token) = get(ENV_TOKEN) {
            connect = connect.token(token);
        }

        Ok(Self { connect })
    }
}

fn parse_bool(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}' is not a boolean", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ConfigResult<RunnerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunnerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(
            config.connect.websocket_url(),
            "ws://hassio.local:8123/api/websocket"
        );
        assert!(config.connect.token.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            (ENV_HOST, "192.168.1.10"),
            (ENV_PORT, "443"),
            (ENV_PATH, "api/websocket"),
            (ENV_SECURE, "true"),
            (ENV_TOKEN, "abc"),
        ])
        .unwrap();
        assert_eq!(
            config.connect.websocket_url(),
            "wss://192.168.1.10:443/api/websocket"
        );
        assert_eq!(config.connect.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_url_wins() {
        let config = load(&[(ENV_URL, "ws://localhost:1234/ws"), (ENV_HOST, "ignored")]).unwrap();
        assert_eq!(config.connect.websocket_url(), "ws://localhost:1234/ws");
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = load(&[(ENV_PORT, ""), (ENV_TOKEN, "  ")]).unwrap();
        assert_eq!(config.connect.port, 8123);
        assert!(config.connect.token.is_none());
    }

    #[test]
    fn test_invalid_values() {
        for vars in [
            vec![(ENV_PORT, "eighty")],
            vec![(ENV_PORT, "70000")],
            vec![(ENV_SECURE, "maybe")],
            vec![(ENV_URL, "http://localhost")],
        ] {
            match load(&vars) {
                Err(ConfigError::InvalidValue { key, .. }) => assert_eq!(key, vars[0].0),
                other => panic!("expected InvalidValue for {:?}, got {:?}", vars, other),
            }
        }
    }
}
