//! Scripted transport shared by the client tests.
//!
//! Every transport opened through [`Scripted::connector`] pops replies from
//! one queue and records what it was sent, so a test can assert on the exact
//! frames a request/response cycle produced.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use client::{Client, ClientConfig};
use protocol::{ClientError, Connector, Endpoint, Envelope, Method, Transport};
use serde_json::Value;

pub enum Reply {
    Payload(Value),
    /// The socket fails while the request is in flight.
    Drop,
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub host: String,
    pub method: Method,
    pub args: Value,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    sent: Vec<Sent>,
    refused: Vec<String>,
    opened: Vec<Endpoint>,
}

/// Handle to a shared script. Clones see the same queue and log.
#[derive(Clone, Default)]
pub struct Scripted(Rc<RefCell<Script>>);

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply payload.
    pub fn reply(&self, payload: Value) -> &Self {
        self.0.borrow_mut().replies.push_back(Reply::Payload(payload));
        self
    }

    /// Queues a socket failure.
    pub fn drop_connection(&self) -> &Self {
        self.0.borrow_mut().replies.push_back(Reply::Drop);
        self
    }

    /// Makes connections to `host` fail.
    pub fn refuse(&self, host: &str) -> &Self {
        self.0.borrow_mut().refused.push(host.to_string());
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.0.borrow().sent.clone()
    }

    pub fn opened(&self) -> Vec<Endpoint> {
        self.0.borrow().opened.clone()
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().replies.len()
    }

    pub fn connector(&self) -> Box<dyn Connector> {
        Box::new(ScriptedConnector(self.clone()))
    }

    pub fn client(&self, config: ClientConfig) -> Client {
        Client::with_connector(config, self.connector()).unwrap()
    }
}

struct ScriptedConnector(Scripted);

impl Connector for ScriptedConnector {
    fn open(&self, endpoint: &Endpoint) -> Box<dyn Transport> {
        (self.0).0.borrow_mut().opened.push(endpoint.clone());
        Box::new(ScriptedTransport {
            endpoint: endpoint.clone(),
            script: self.0.clone(),
            connected: false,
            count: 0,
        })
    }
}

struct ScriptedTransport {
    endpoint: Endpoint,
    script: Scripted,
    connected: bool,
    count: u64,
}

impl Transport for ScriptedTransport {
    fn connect(&mut self) -> Result<(), ClientError> {
        if self.script.0.borrow().refused.contains(&self.endpoint.host) {
            return Err(ClientError::Network {
                code: Some(111),
                message: format!("Unable to connect to {} (Connection refused)", self.endpoint),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn request(&mut self, method: Method, args: Value) -> Result<Envelope, ClientError> {
        if !self.connected {
            return Err(ClientError::Network {
                code: None,
                message: format!("Unable to execute '{method}' (Error: Connection closed)"),
            });
        }
        self.count += 1;
        let reply = {
            let mut script = self.script.0.borrow_mut();
            script.sent.push(Sent {
                host: self.endpoint.host.clone(),
                method,
                args,
            });
            script.replies.pop_front()
        };
        match reply {
            None => Err(ClientError::protocol("no scripted reply", None)),
            Some(Reply::Drop) => {
                self.connected = false;
                Err(ClientError::Network {
                    code: Some(104),
                    message: "Unable to read from server (Connection reset by peer)".into(),
                })
            }
            Some(Reply::Payload(Value::Object(payload))) => match Envelope::classify(payload) {
                Envelope::Error(message) => Err(ClientError::Server { message }),
                envelope => {
                    if envelope.ends_session() {
                        self.connected = false;
                    }
                    Ok(envelope)
                }
            },
            Some(Reply::Payload(other)) => Err(ClientError::protocol(
                format!("Invalid response from server ({other})"),
                None,
            )),
        }
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn request_count(&self) -> u64 {
        self.count
    }
}

/// A configuration pointing at host `primary`.
pub fn config() -> ClientConfig {
    ClientConfig {
        host: "primary".to_string(),
        ..ClientConfig::new("client-1", "secret-key")
    }
}
