//! Request orchestration: cache lookup, connection set-up, the credential
//! handshake, rescue failover and response post-processing.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use cache::Cache;
use protocol::{
    auth_key, keys, ClientError, ClientId, Connector, Endpoint, Envelope, Method, Payload,
    RetryPolicy, Transport,
};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument, warn};
use transport::TcpConnector;

use crate::{ClientConfig, Node, Resource};

/// Handle to a configured Schema client.
///
/// Clones share one connection, one cache and one authentication state.
/// Resources returned by a client hold a clone so they can resolve links
/// lazily. Not thread-safe: one request is in flight at a time.
#[derive(Clone)]
pub struct Client {
    inner: Rc<RefCell<Session>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(session) => f
                .debug_struct("Client")
                .field("client_id", &session.client_id)
                .field("endpoint", &session.config.endpoint())
                .field("authed", &session.authed)
                .field("rescued", &session.rescued)
                .finish(),
            Err(_) => f.write_str("Client { .. }"),
        }
    }
}

impl Client {
    /// Creates a client that connects over TCP/TLS.
    ///
    /// # Errors
    ///
    /// [`ClientError::Configuration`] when the configuration is invalid or
    /// the CA bundle cannot be loaded.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let connector = TcpConnector::new(&config.transport())?;
        Self::with_connector(config, Box::new(connector))
    }

    /// Creates a client that opens its transports through `connector`.
    pub fn with_connector(
        config: ClientConfig,
        connector: Box<dyn Connector>,
    ) -> Result<Self, ClientError> {
        let client_id = config.validate()?;
        let cache = config.cache.clone().map(|cache_config| {
            let owner = ClientId::new(config.acting_client()).unwrap_or_else(|| client_id.clone());
            Cache::new(owner, cache_config)
        });
        info!(client_id = %client_id, endpoint = %config.endpoint(), "client configured");
        Ok(Self {
            inner: Rc::new(RefCell::new(Session {
                config,
                client_id,
                connector,
                server: None,
                cache,
                authed: false,
                rescued: false,
            })),
        })
    }

    /// Reads `url`, answering from the cache when a confirmed entry exists.
    pub fn get(&self, url: &str, data: Value) -> Result<Node, ClientError> {
        let hit = self.inner.borrow_mut().cached(url, &data)?;
        if let Some(result) = hit {
            return Ok(self.node(result));
        }
        self.send(Method::Get, url, data)
    }

    pub fn put(&self, url: &str, data: Value) -> Result<Node, ClientError> {
        self.send(Method::Put, url, data)
    }

    pub fn post(&self, url: &str, data: Value) -> Result<Node, ClientError> {
        self.send(Method::Post, url, data)
    }

    pub fn delete(&self, url: &str, data: Value) -> Result<Node, ClientError> {
        self.send(Method::Delete, url, data)
    }

    /// Writes a resource back to its own url.
    pub fn put_resource(&self, resource: &Resource) -> Result<Node, ClientError> {
        self.put(resource.url(), resource.data(false))
    }

    /// Issues `method` against `url`. Reads go through the cache.
    ///
    /// # Errors
    ///
    /// [`ClientError::Configuration`] for [`Method::Auth`]; use [`Client::auth`].
    pub fn request(&self, method: Method, url: &str, data: Value) -> Result<Node, ClientError> {
        match method {
            Method::Get => self.get(url, data),
            Method::Auth => Err(ClientError::Configuration {
                message: "auth requests go through Client::auth".to_string(),
            }),
            _ => self.send(method, url, data),
        }
    }

    /// Runs the credential handshake and returns the server's reply.
    ///
    /// Without a `nonce` one is requested from the server first.
    pub fn auth(&self, nonce: Option<&str>) -> Result<Payload, ClientError> {
        let envelope = {
            let mut session = self.inner.borrow_mut();
            session.connect_if_needed()?;
            session.handshake(nonce)?
        };
        match envelope {
            Envelope::Data(result) => Ok(result),
            Envelope::AuthChallenge { .. } => Err(ClientError::Server {
                message: "Authentication rejected".to_string(),
            }),
            Envelope::End(_) => Err(ClientError::SessionEnded {
                method: Method::Auth.to_string(),
            }),
            Envelope::Error(message) => Err(ClientError::Server { message }),
        }
    }

    /// A copy of the active configuration.
    pub fn config(&self) -> ClientConfig {
        self.inner.borrow().config.clone()
    }

    /// Page size applied to live link fetches.
    pub fn default_limit(&self) -> Option<u32> {
        self.inner.borrow().config.default_limit
    }

    pub fn set_default_limit(&self, limit: Option<u32>) {
        self.inner.borrow_mut().config.default_limit = limit;
    }

    /// Returns `true` once credentials have been sent on the current session.
    pub fn is_authenticated(&self) -> bool {
        self.inner.borrow().authed
    }

    /// Returns `true` once the client has failed over to the rescue endpoint.
    pub fn is_rescued(&self) -> bool {
        self.inner.borrow().rescued
    }

    /// Runs `f` against the response cache, if one is configured.
    pub fn with_cache<R>(&self, f: impl FnOnce(&mut Cache) -> R) -> Option<R> {
        self.inner.borrow_mut().cache.as_mut().map(f)
    }

    /// Closes the current connection. The next request reconnects.
    pub fn close(&self) {
        if let Some(server) = self.inner.borrow_mut().server.as_mut() {
            server.close();
        }
    }

    fn send(&self, method: Method, url: &str, data: Value) -> Result<Node, ClientError> {
        let result = self.inner.borrow_mut().request(method, url, &data)?;
        Ok(self.node(result))
    }

    /// Wraps a result payload: structured `$data` becomes a resource, a scalar
    /// is returned as is, and no `$data` is null.
    fn node(&self, result: Payload) -> Node {
        match result.get(keys::DATA) {
            Some(Value::Object(_) | Value::Array(_)) => {
                Node::Resource(Resource::instance(result, Some(self.clone())))
            }
            Some(value) => Node::Value(value.clone()),
            None => Node::Value(Value::Null),
        }
    }
}

/// The arguments a read is cached under.
fn cache_args(data: &Value) -> Value {
    let mut args = Map::new();
    args.insert(keys::DATA.to_string(), data.clone());
    Value::Object(args)
}

/// Mutable state shared by every clone of a [`Client`].
struct Session {
    config: ClientConfig,
    client_id: ClientId,
    connector: Box<dyn Connector>,
    server: Option<Box<dyn Transport>>,
    cache: Option<Cache>,
    authed: bool,
    rescued: bool,
}

impl Session {
    fn is_connected(&self) -> bool {
        self.server.as_ref().is_some_and(|server| server.is_connected())
    }

    fn cached(&mut self, url: &str, data: &Value) -> Result<Option<Payload>, ClientError> {
        let Some(cache) = self.cache.as_mut() else {
            return Ok(None);
        };
        let hit = cache.get(url, &cache_args(data))?;
        Ok(hit.filter(|result| result.contains_key(keys::DATA)))
    }

    /// One request/response cycle against the server.
    ///
    /// An auth challenge is answered in place. A challenge that also ends the
    /// session replays the request once on a fresh connection.
    #[instrument(skip(self, method, data), fields(method = %method))]
    fn request(&mut self, method: Method, url: &str, data: &Value) -> Result<Payload, ClientError> {
        let mut replayed = false;
        loop {
            let call = self.prepare(data);
            let envelope = self.exchange(method, json!([url, call]))?;
            match self.settle(method, envelope)? {
                Some(result) => return self.respond(method, url, data, result),
                None if !replayed => {
                    replayed = true;
                    self.authed = false;
                    info!(url, "session ended by server; replaying on a fresh connection");
                }
                None => {
                    return Err(ClientError::SessionEnded {
                        method: method.to_string(),
                    })
                }
            }
        }
    }

    /// Builds the request arguments. The first request on a new connection
    /// also carries the proxy target and the client's identity.
    fn prepare(&mut self, data: &Value) -> Payload {
        let mut call = Map::new();
        call.insert(keys::DATA.to_string(), data.clone());
        if self.is_connected() {
            return call;
        }

        let acting = self.config.acting_client().to_string();
        if self.config.proxy.is_some() && !self.rescued {
            call.insert(
                keys::PROXY.to_string(),
                json!({
                    "client": acting,
                    "host": self.config.host,
                    "port": self.config.port,
                }),
            );
        }
        if !self.authed {
            call.insert(keys::CLIENT.to_string(), Value::String(acting));
            if self.sends_credentials() {
                call.insert(
                    keys::KEY.to_string(),
                    Value::String(self.config.client_key.clone()),
                );
                if let Some(cache) = self.cache.as_mut() {
                    call.insert(keys::CACHED.to_string(), Value::Object(cache.version_table()));
                }
                if let Some(session) = &self.config.session {
                    call.insert(keys::SESSION.to_string(), Value::String(session.to_string()));
                }
            }
        }
        call
    }

    /// Credentials ride along with the first request only on direct TLS
    /// connections made as this client.
    fn sends_credentials(&self) -> bool {
        !self.target().clear && self.config.route.is_none() && self.config.proxy.is_none()
    }

    /// The endpoint the next connection should be opened to.
    fn target(&self) -> Endpoint {
        if self.rescued {
            if let Some(rescue) = self.config.rescue_endpoint() {
                return rescue;
            }
        }
        self.config.proxied_endpoint()
    }

    fn connect_if_needed(&mut self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Ok(());
        }
        let endpoint = self.target();
        debug!(%endpoint, "connecting");
        let mut server = self.connector.open(&endpoint);
        let connected = server.connect();
        self.server = Some(server);
        connected
    }

    fn server(&mut self) -> Result<&mut Box<dyn Transport>, ClientError> {
        self.server.as_mut().ok_or_else(|| ClientError::Network {
            code: None,
            message: "Connection closed".to_string(),
        })
    }

    /// Connects if needed and sends one frame, failing over once on a
    /// socket-level error.
    fn exchange(&mut self, method: Method, args: Value) -> Result<Envelope, ClientError> {
        let attempt = match self.connect_if_needed() {
            Ok(()) => self.server().and_then(|server| server.request(method, args.clone())),
            Err(e) => Err(e),
        };
        match attempt {
            Err(e) if e.retry_policy() == RetryPolicy::Failover => {
                self.rescue(e)?;
                self.server()?.request(method, args)
            }
            other => other,
        }
    }

    /// Resolves auth challenges. `Ok(None)` means the session ended before
    /// the request was answered and it must be replayed.
    fn settle(
        &mut self,
        method: Method,
        mut envelope: Envelope,
    ) -> Result<Option<Payload>, ClientError> {
        let mut challenged = false;
        loop {
            envelope = match envelope {
                Envelope::Data(result) => return Ok(Some(result)),
                Envelope::AuthChallenge {
                    session_ended: true,
                    ..
                } => return Ok(None),
                Envelope::AuthChallenge { nonce, .. } if !challenged => {
                    challenged = true;
                    self.handshake(nonce.as_deref())?
                }
                Envelope::AuthChallenge { .. } => {
                    return Err(ClientError::Server {
                        message: "Authentication rejected".to_string(),
                    })
                }
                Envelope::End(_) => {
                    return Err(ClientError::SessionEnded {
                        method: method.to_string(),
                    })
                }
                Envelope::Error(message) => return Err(ClientError::Server { message }),
            };
        }
    }

    /// Answers the challenge for `nonce`, fetching one first when absent.
    fn handshake(&mut self, nonce: Option<&str>) -> Result<Envelope, ClientError> {
        let nonce = match nonce {
            Some(nonce) => nonce.to_string(),
            None => self.fetch_nonce()?,
        };
        let params = self.auth_params(&nonce);
        self.authed = true;
        info!(client_id = %self.client_id, "authenticating");
        match self.server()?.request(Method::Auth, json!([params])) {
            Err(e) if e.retry_policy() == RetryPolicy::Failover => {
                self.rescue(e)?;
                self.handshake(None)
            }
            other => other,
        }
    }

    fn fetch_nonce(&mut self) -> Result<String, ClientError> {
        self.connect_if_needed()?;
        let reply = self.server()?.request(Method::Auth, json!([]))?;
        match reply {
            Envelope::AuthChallenge {
                nonce: Some(nonce), ..
            } => Ok(nonce),
            Envelope::Data(payload) => match payload.get(keys::DATA) {
                Some(Value::String(nonce)) if !nonce.is_empty() => Ok(nonce.clone()),
                _ => Err(ClientError::protocol("Server did not supply an auth nonce", None)),
            },
            _ => Err(ClientError::protocol("Server did not supply an auth nonce", None)),
        }
    }

    fn auth_params(&mut self, nonce: &str) -> Payload {
        let config = &self.config;
        let mut params = Map::new();
        params.insert("client".to_string(), Value::String(config.client_id.clone()));
        params.insert(
            "key".to_string(),
            Value::String(auth_key(nonce, &config.client_id, &config.client_key)),
        );
        if config.version > 0 {
            params.insert(keys::VERSION.to_string(), Value::from(config.version));
        }
        if let Some(api) = &config.api {
            params.insert(keys::API.to_string(), Value::String(api.clone()));
        }
        if let Some(session) = &config.session {
            params.insert(keys::SESSION.to_string(), Value::String(session.to_string()));
        }
        if let Some(route) = &config.route {
            params.insert(keys::ROUTE.to_string(), route.to_value());
        }
        if let Some(ip) = &config.caller_ip {
            params.insert(keys::IP.to_string(), Value::String(ip.clone()));
        }
        if let Some(cache) = self.cache.as_mut() {
            params.insert(keys::CACHED.to_string(), Value::Object(cache.version_table()));
        }
        params
    }

    /// Switches to the rescue endpoint, once. Returns `error` when failover
    /// is not possible.
    fn rescue(&mut self, error: ClientError) -> Result<(), ClientError> {
        let Some(endpoint) = self.config.rescue_endpoint() else {
            return Err(error);
        };
        if self.config.client_key.is_empty() || self.rescued {
            return Err(error);
        }
        warn!(error = %error, rescue = %endpoint, "primary endpoint failed; failing over");
        self.rescued = true;
        if let Some(mut failed) = self.server.take() {
            failed.close();
        }
        let mut server = self.connector.open(&endpoint);
        let connected = server.connect();
        self.server = Some(server);
        connected
    }

    /// Stamps the url, invalidates stale cache entries and caches reads.
    fn respond(
        &mut self,
        method: Method,
        url: &str,
        data: &Value,
        mut result: Payload,
    ) -> Result<Payload, ClientError> {
        result
            .entry(keys::URL)
            .or_insert_with(|| Value::String(url.to_string()));
        if let Some(cache) = self.cache.as_mut() {
            cache.clear(&result)?;
            if method.is_read() {
                cache.put(url, &cache_args(data), &result)?;
            }
        }
        Ok(result)
    }
}
