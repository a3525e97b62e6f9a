//! Connection options

use std::time::Duration;

/// Default hub host name on a stock install
pub const DEFAULT_HOST: &str = "hassio.local";

/// Default hub port
pub const DEFAULT_PORT: u16 = 8123;

/// Default websocket API path
pub const DEFAULT_PATH: &str = "/api/websocket";

/// Default time allowed for opening the socket and authenticating
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default buffer size of each per-event-type broadcast stream
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Where and how to connect to the hub
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Use `wss` instead of `ws`
    pub secure: bool,
    /// Long-lived access token
    pub token: Option<String>,
    /// Full websocket URL; overrides host/port/path/secure when set
    pub url: Option<String>,
    pub handshake_timeout: Duration,
    pub channel_capacity: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            secure: false,
            token: None,
            url: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// The websocket location to open
    pub fn websocket_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let scheme = if self.secure { "wss" } else { "ws" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", scheme, self.host, self.port, path)
    }

    /// The token to authenticate with, treating an empty string as absent
    pub(crate) fn usable_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}
