//! Transport layer abstraction for command batches.

use crate::error::{ClientError, ClientResult};
use dolphin_protocol::Command;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Sends one command batch and returns the server's response commands.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
pub trait CommandTransport: Send + Sync {
    /// Transmits a batch and returns the response commands in order.
    fn transmit(&self, commands: &[Command]) -> ClientResult<Vec<Command>>;

    /// Returns the session id assigned by the server, if any.
    fn client_id(&self) -> Option<String>;

    /// Prepares a new session.
    fn connect(&self) {}

    /// Forgets the current session.
    fn disconnect(&self) {}
}

type Responder = Arc<dyn Fn(&[Command]) -> ClientResult<Vec<Command>> + Send + Sync>;

/// A recording transport for testing.
///
/// Every transmitted batch is recorded. Responses come from an optional
/// responder closure; without one every batch gets an empty response.
pub struct MockTransport {
    sent: Mutex<Vec<Vec<Command>>>,
    responder: Mutex<Option<Responder>>,
    connected: AtomicBool,
}

impl MockTransport {
    /// Creates a mock transport answering every batch with no commands.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            connected: AtomicBool::new(true),
        }
    }

    /// Sets the closure producing responses.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[Command]) -> ClientResult<Vec<Command>> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Arc::new(responder));
    }

    /// Sets the connected state. A disconnected mock fails every batch.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns all batches transmitted so far.
    pub fn sent_batches(&self) -> Vec<Vec<Command>> {
        self.sent.lock().clone()
    }

    /// Returns all commands transmitted so far, flattened.
    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent.lock().iter().flatten().cloned().collect()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTransport for MockTransport {
    fn transmit(&self, commands: &[Command]) -> ClientResult<Vec<Command>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::transport("mock transport disconnected"));
        }
        self.sent.lock().push(commands.to_vec());
        let responder = self.responder.lock().clone();
        match responder {
            Some(responder) => responder(commands),
            None => Ok(Vec::new()),
        }
    }

    fn client_id(&self) -> Option<String> {
        Some("mock".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_records_batches() {
        let transport = MockTransport::new();
        transport
            .transmit(&[Command::CreateContext, Command::Empty])
            .unwrap();
        transport.transmit(&[Command::StartLongPoll]).unwrap();

        assert_eq!(transport.sent_batches().len(), 2);
        assert_eq!(transport.sent_commands().len(), 3);
    }

    #[test]
    fn mock_responder() {
        let transport = MockTransport::new();
        transport.set_responder(|commands| Ok(commands.iter().rev().cloned().collect()));
        let response = transport
            .transmit(&[Command::CreateContext, Command::Empty])
            .unwrap();
        assert_eq!(response, vec![Command::Empty, Command::CreateContext]);
    }

    #[test]
    fn mock_disconnected() {
        let transport = MockTransport::new();
        transport.set_connected(false);
        assert!(transport.transmit(&[Command::Empty]).unwrap_err().is_transport());
        assert!(transport.sent_batches().is_empty());
    }
}
