//! Protocol message types for extension↔host communication.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Native-messaging host name the extension connects to.
pub const HOST_NAME: &str = "com.outline.proxy";

/// Loopback address the proxy's SOCKS listener binds to.
const LOCAL_BIND_HOST: &str = "127.0.0.1";

/// A message in either direction.
///
/// The wire `type` field selects the variant. Tags outside the known set
/// decode as [`Message::Unknown`] so the host can answer them instead of
/// dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(clippy::exhaustive_enums)] // closed protocol set, matched exhaustively
pub enum Message {
    /// Sent once by the host when it is ready to accept commands.
    Ready,
    /// Launch (or relaunch) the proxy with the given settings.
    Start {
        /// Proxy settings; a `START` without them is answered with an error.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<ProxyConfig>,
    },
    /// Stop the proxy if one is running.
    Stop,
    /// Ask whether a proxy is currently running.
    Status,
    /// A proxy is running.
    Connected,
    /// No proxy is running.
    Disconnected,
    /// A request failed.
    Error {
        /// Human-readable reason.
        #[serde(default)]
        error: String,
    },
    /// Any tag this host does not understand. Never sent.
    #[serde(other, skip_serializing)]
    Unknown,
}

impl Message {
    /// Builds an [`Message::Error`] reply.
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            error: reason.into(),
        }
    }

    /// Builds a [`Message::Start`] carrying `config`.
    pub fn start(config: ProxyConfig) -> Self {
        Self::Start {
            config: Some(config),
        }
    }
}

/// Shadowsocks connection settings carried by `START`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ProxyConfig {
    /// Remote server hostname or address.
    pub server: String,
    /// Remote server port.
    pub server_port: u16,
    /// Local SOCKS port to listen on.
    pub local_port: u16,
    /// Cipher method name, e.g. `chacha20-ietf-poly1305`.
    pub method: String,
    /// Shared secret.
    pub password: String,
}

impl ProxyConfig {
    /// Creates a config from its parts.
    pub fn new(
        server: impl Into<String>,
        server_port: u16,
        local_port: u16,
        method: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            server_port,
            local_port,
            method: method.into(),
            password: password.into(),
        }
    }

    /// Remote endpoint as `host:port`.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server, self.server_port)
    }

    /// Local bind endpoint, always on loopback.
    pub fn local_addr(&self) -> String {
        format!("{LOCAL_BIND_HOST}:{}", self.local_port)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("server", &self.server)
            .field("server_port", &self.server_port)
            .field("local_port", &self.local_port)
            .field("method", &self.method)
            .field("password", &"<redacted>")
            .finish()
    }
}
