//! TCP/TLS connection implementing [`Transport`].

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use protocol::{ClientError, Connector, Endpoint, Envelope, FrameStyle, Method, RequestId, Transport};
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, StreamOwned};
use serde_json::Value;
use tracing::{debug, info};

use crate::{client_config, codec, TransportConfig};

/// Upper bound on establishing the TCP connection. Reads are unbounded.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

trait Stream: Read + Write {}

impl<T: Read + Write> Stream for T {}

/// One half-duplex connection to an [`Endpoint`].
pub struct Connection {
    endpoint: Endpoint,
    frame: FrameStyle,
    tls: Arc<rustls::ClientConfig>,
    stream: Option<BufReader<Box<dyn Stream>>>,
    request_count: u64,
    last_request_id: Option<RequestId>,
    last_request: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("frame", &self.frame)
            .field("connected", &self.stream.is_some())
            .field("request_count", &self.request_count)
            .finish()
    }
}

impl Connection {
    /// Creates an unconnected connection.
    pub fn new(endpoint: Endpoint, frame: FrameStyle, tls: Arc<rustls::ClientConfig>) -> Self {
        Self {
            endpoint,
            frame,
            tls,
            stream: None,
            request_count: 0,
            last_request_id: None,
            last_request: None,
        }
    }

    /// Identifier of the most recent request frame.
    pub fn last_request_id(&self) -> Option<RequestId> {
        self.last_request_id
    }

    fn open_tcp(&self) -> Result<TcpStream, ClientError> {
        let target = format!("{}:{}", self.endpoint.host, self.endpoint.port);
        let context = || format!("Unable to connect to {target}");
        let addrs = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()
            .map_err(|e| ClientError::network(context(), &e))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|e| ClientError::network(context(), &e))?;
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => ClientError::network(context(), &e),
            None => ClientError::Network {
                code: None,
                message: format!("{} (no addresses resolved)", context()),
            },
        })
    }

    fn open_tls(&self, mut tcp: TcpStream) -> Result<Box<dyn Stream>, ClientError> {
        let target = self.endpoint.to_string();
        let name = ServerName::try_from(self.endpoint.host.clone()).map_err(|e| {
            ClientError::Network {
                code: None,
                message: format!("Unable to connect to {target} (invalid server name: {e})"),
            }
        })?;
        let mut session = ClientConnection::new(Arc::clone(&self.tls), name).map_err(|e| {
            ClientError::Network {
                code: None,
                message: format!("Unable to connect to {target} ({e})"),
            }
        })?;

        // Drive the handshake now so a failed handshake fails the connect,
        // not the first request.
        while session.is_handshaking() {
            session.complete_io(&mut tcp).map_err(|e| ClientError::Network {
                code: e.raw_os_error(),
                message: format!("Unable to connect to {target} (TLS handshake failed: {e})"),
            })?;
        }
        Ok(Box::new(StreamOwned::new(session, tcp)))
    }
}

impl Transport for Connection {
    fn connect(&mut self) -> Result<(), ClientError> {
        let tcp = self.open_tcp()?;
        let stream: Box<dyn Stream> = if self.endpoint.clear {
            Box::new(tcp)
        } else {
            self.open_tls(tcp)?
        };
        self.stream = Some(BufReader::new(stream));
        info!(endpoint = %self.endpoint, clear = self.endpoint.clear, "connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn request(&mut self, method: Method, args: Value) -> Result<Envelope, ClientError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::Network {
                code: None,
                message: format!("Unable to execute '{method}' (Error: Connection closed)"),
            });
        };

        let id = RequestId::new_random();
        let frame = codec::encode_request(self.frame, id, method, &args)?;
        let written = stream
            .get_mut()
            .write_all(frame.as_bytes())
            .and_then(|()| stream.get_mut().flush());
        self.last_request_id = Some(id);
        self.last_request = Some(frame.trim_end().to_string());
        if let Err(e) = written {
            self.close();
            return Err(ClientError::network(
                format!("Unable to execute '{method}' on {}", self.endpoint),
                &e,
            ));
        }
        self.request_count += 1;
        debug!(%method, id = %id, bytes = frame.len(), "request written");

        // Blocks until the peer answers; there is deliberately no timeout.
        let mut line = String::new();
        let read = stream.read_line(&mut line);
        let last_request = self.last_request.clone().unwrap_or_default();
        match read {
            Ok(n) if n > 0 => {}
            _ => {
                self.close();
                return Err(ClientError::protocol(
                    "Unable to read response from server",
                    Some(last_request),
                ));
            }
        }
        debug!(%method, bytes = line.len(), "response read");

        let payload = codec::decode_reply(self.frame, &line, &last_request)?;
        match Envelope::classify(payload) {
            Envelope::Error(message) => Err(ClientError::Server { message }),
            envelope => {
                if envelope.ends_session() {
                    info!(endpoint = %self.endpoint, "server ended session");
                    self.close();
                }
                Ok(envelope)
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(endpoint = %self.endpoint, "connection closed");
        }
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn request_count(&self) -> u64 {
        self.request_count
    }
}

/// Opens [`Connection`]s sharing one TLS configuration.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    frame: FrameStyle,
    tls: Arc<rustls::ClientConfig>,
}

impl TcpConnector {
    /// Validates `config` and prepares the TLS configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, ClientError> {
        Ok(Self {
            frame: config.frame,
            tls: client_config(config)?,
        })
    }
}

impl Connector for TcpConnector {
    fn open(&self, endpoint: &Endpoint) -> Box<dyn Transport> {
        Box::new(Connection::new(
            endpoint.clone(),
            self.frame,
            Arc::clone(&self.tls),
        ))
    }
}
