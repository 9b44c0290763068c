//! Client configuration.
//!
//! Deserialised from the `[client]`-less top level of a TOML file by the CLI,
//! or built in code. Every field has a default except the credentials.

use std::path::PathBuf;

use cache::CacheConfig;
use protocol::{ClientError, ClientId, Endpoint, FrameStyle, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use transport::TransportConfig;

pub const DEFAULT_HOST: &str = "api.schema.io";
pub const DEFAULT_PORT: u16 = 8443;
pub const DEFAULT_RESCUE_HOST: &str = "rescue.api.schema.io";
pub const DEFAULT_RESCUE_PORT: u16 = 8443;

/// Everything needed to talk to one server on behalf of one client account.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_key: String,
    pub host: String,
    pub port: u16,
    /// Plaintext TCP instead of TLS.
    pub clear: bool,
    pub verify_cert: bool,
    pub ca_bundle: Option<PathBuf>,
    pub verify_depth: u8,
    /// Protocol version sent as `$v` during auth; `0` omits it.
    pub version: u32,
    pub api: Option<String>,
    pub session: Option<SessionId>,
    pub rescue: Option<RescueConfig>,
    pub route: Option<RouteConfig>,
    pub proxy: Option<ProxyConfig>,
    pub cache: Option<CacheConfig>,
    pub frame: FrameStyle,
    /// Page size applied to live link fetches.
    pub default_limit: Option<u32>,
    /// Address of the end user on whose behalf requests are made, sent as `$ip`.
    pub caller_ip: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_key: String::new(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            clear: false,
            verify_cert: true,
            ca_bundle: None,
            verify_depth: 5,
            version: 1,
            api: None,
            session: None,
            rescue: None,
            route: None,
            proxy: None,
            cache: None,
            frame: FrameStyle::default(),
            default_limit: None,
            caller_ip: None,
        }
    }
}

impl ClientConfig {
    /// Configuration for `client_id`/`client_key` with every other field defaulted.
    pub fn new(client_id: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_key: client_key.into(),
            ..Self::default()
        }
    }

    /// Checks the configuration and returns the client identity.
    pub fn validate(&self) -> Result<ClientId, ClientError> {
        let client_id = ClientId::new(self.client_id.as_str()).ok_or_else(|| {
            ClientError::Configuration {
                message: "client_id is required".to_string(),
            }
        })?;
        if let Some(route) = &self.route {
            if route.client.is_empty() {
                return Err(ClientError::Configuration {
                    message: "route.client must not be empty".to_string(),
                });
            }
        }
        self.transport().validate()?;
        Ok(client_id)
    }

    /// Stream settings for the connector.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            verify_cert: self.verify_cert,
            ca_bundle: self.ca_bundle.clone(),
            verify_depth: self.verify_depth,
            frame: self.frame,
        }
    }

    /// The primary endpoint.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
            clear: self.clear,
        }
    }

    /// The endpoint to open first: the proxy when one is configured.
    pub fn proxied_endpoint(&self) -> Endpoint {
        match &self.proxy {
            Some(proxy) => Endpoint {
                host: proxy.host.clone().unwrap_or_else(|| self.host.clone()),
                port: proxy.port.unwrap_or(self.port),
                clear: proxy.clear,
            },
            None => self.endpoint(),
        }
    }

    /// The rescue endpoint, when failover is enabled.
    pub fn rescue_endpoint(&self) -> Option<Endpoint> {
        self.rescue.as_ref().map(|rescue| Endpoint {
            host: rescue.host.clone(),
            port: rescue.port,
            clear: self.clear,
        })
    }

    /// The identity requests are made as: the routed client when routing,
    /// otherwise this client.
    pub fn acting_client(&self) -> &str {
        self.route
            .as_ref()
            .map_or(self.client_id.as_str(), |route| route.client.as_str())
    }
}

/// Secondary endpoint used once when the primary fails at the socket level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RescueConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RescueConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RESCUE_HOST.to_string(),
            port: DEFAULT_RESCUE_PORT,
        }
    }
}

/// Requests made on behalf of another client account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub client: String,
    /// Additional routing attributes forwarded verbatim in `$route`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RouteConfig {
    /// Route to `client` with no extra attributes.
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            extra: Map::new(),
        }
    }

    /// The `$route` value.
    pub fn to_value(&self) -> Value {
        let mut route = self.extra.clone();
        route.insert("client".to_string(), Value::String(self.client.clone()));
        Value::Object(route)
    }
}

/// Intermediary that forwards requests to the configured host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub clear: bool,
}
