//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the connector.
//! The actual HTTP client is abstracted via a trait so that real network
//! clients and in-process loopbacks can be plugged in alike.

use crate::error::{ClientError, ClientResult};
use crate::transport::CommandTransport;
use dolphin_protocol::{status, Codec, Command, HttpResponse, JsonCodec};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP exchange: POST `body` to
/// `url`, sending `client_id` in the client id header when present, and
/// return the status, the client id header of the response and its body.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response.
    fn post(&self, url: &str, client_id: Option<&str>, body: String) -> Result<HttpResponse, String>;
}

/// HTTP-based command transport.
///
/// Uses the JSON codec for request and response bodies and tracks the
/// session id handed out by the server.
pub struct HttpTransport<C: HttpClient> {
    url: String,
    client: C,
    codec: JsonCodec,
    client_id: Mutex<Option<String>>,
    /// Set once a `DestroyContext` went out; later transmissions are skipped.
    disconnecting: AtomicBool,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(url: impl Into<String>, client: C) -> Self {
        Self {
            url: url.into(),
            client,
            codec: JsonCodec::new(),
            client_id: Mutex::new(None),
            disconnecting: AtomicBool::new(false),
        }
    }

    /// Returns the endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns true once a `DestroyContext` has been sent.
    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::SeqCst)
    }

    fn check_client_id(&self, received: Option<String>) -> ClientResult<()> {
        let mut current = self.client_id.lock();
        match (current.as_deref(), received) {
            (Some(known), Some(received)) if known != received => Err(ClientError::session(
                format!("client id changed from {known} to {received}"),
            )),
            (None, Some(received)) => {
                trace!(client_id = %received, "session assigned");
                *current = Some(received);
                Ok(())
            }
            (_, None) => Err(ClientError::session("no client id in response")),
            _ => Ok(()),
        }
    }
}

impl<C: HttpClient> CommandTransport for HttpTransport<C> {
    fn transmit(&self, commands: &[Command]) -> ClientResult<Vec<Command>> {
        if self.is_disconnecting() {
            warn!("communication canceled by disconnect");
            return Ok(Vec::new());
        }
        if commands.iter().any(|c| matches!(c, Command::DestroyContext)) {
            self.disconnecting.store(true, Ordering::SeqCst);
        }

        let body = self.codec.encode(commands)?;
        let client_id = self.client_id.lock().clone();
        let response = self
            .client
            .post(&self.url, client_id.as_deref(), body)
            .map_err(ClientError::transport)?;

        if response.status == status::REQUEST_TIMEOUT {
            return Err(ClientError::session("server can not handle the client id"));
        }
        if response.status >= 300 {
            return Err(ClientError::Http {
                status: response.status,
                message: response.body,
            });
        }
        self.check_client_id(response.client_id)?;

        if matches!(commands, [Command::InterruptLongPoll]) {
            return Ok(Vec::new());
        }
        Ok(self.codec.decode(&response.body)?)
    }

    fn client_id(&self) -> Option<String> {
        self.client_id.lock().clone()
    }

    fn connect(&self) {
        *self.client_id.lock() = None;
        self.disconnecting.store(false, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        *self.client_id.lock() = None;
        self.disconnecting.store(false, Ordering::SeqCst);
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing and for in-process clients without network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

/// Trait for servers that can handle loopback requests.
///
/// Implemented for closures, so a server facade can be wired in with
/// `LoopbackClient::new(move |id, body| server.handle_request(id, body))`.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the response.
    fn handle_post(&self, client_id: Option<&str>, body: &str) -> HttpResponse;
}

impl<F> LoopbackServer for F
where
    F: Fn(Option<&str>, &str) -> HttpResponse + Send + Sync,
{
    fn handle_post(&self, client_id: Option<&str>, body: &str) -> HttpResponse {
        self(client_id, body)
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(&self, _url: &str, client_id: Option<&str>, body: String) -> Result<HttpResponse, String> {
        Ok(self.server.handle_post(client_id, &body))
    }
}
