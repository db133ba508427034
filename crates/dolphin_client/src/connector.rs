//! The client connector: batching, transmission and the long-poll loop.
//!
//! ## Architecture
//!
//! ```text
//! send() ──► CommandBatcher ──► transmit thread ──► CommandTransport
//!                                     │
//!                                     ▼
//!                               UiExecutor: dispatch response into the
//!                               ModelStore, then call the batch handler
//! ```
//!
//! ## State machine
//!
//! Batches move through idle → batching → transmitting → dispatching → idle.
//! In parallel, the connector is either *waiting* on a long poll or not:
//! - `listen()` issues a `StartLongPoll` unless push is disabled or a poll is
//!   already outstanding
//! - sending any other command calls `release()`, which interrupts the
//!   outstanding poll on a separate thread
//! - once a poll's response is dispatched, a new poll is issued
//!
//! A batch's handler runs before the response of any other batch is
//! dispatched, so whatever it reads from the store reflects its own response.

use crate::batcher::{BatchOutcome, CommandAndHandler, CommandBatcher, ResponseHandler};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::response_handler::ClientResponseHandler;
use crate::transport::CommandTransport;
use dolphin_model::ModelStore;
use dolphin_protocol::Command;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, error, info, trace, warn};

/// Runs response processing in the application's foreground context.
///
/// UI toolkits implement this to hop onto their event thread. Tasks must be
/// run in submission order.
pub trait UiExecutor: Send + Sync {
    /// Runs or schedules a task.
    fn execute(&self, task: Box<dyn FnOnce() + Send>);
}

/// Runs tasks immediately on the calling (transmit) thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl UiExecutor for DirectExecutor {
    fn execute(&self, task: Box<dyn FnOnce() + Send>) {
        task();
    }
}

/// Receives transport and dispatch failures.
pub type ExceptionHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct PollState {
    push_enabled: bool,
    waiting: bool,
}

struct ConnectorInner {
    batcher: Arc<CommandBatcher>,
    transport: Arc<dyn CommandTransport>,
    store: Arc<Mutex<ModelStore>>,
    response_handler: ClientResponseHandler,
    executor: Arc<dyn UiExecutor>,
    exception_handler: RwLock<ExceptionHandler>,
    poll: Mutex<PollState>,
    /// Held from dispatching a response until its handler returns.
    dispatch: Mutex<()>,
}

/// Connects a client model store to a server through a transport.
///
/// Cloning yields another handle to the same connector.
#[derive(Clone)]
pub struct ClientConnector {
    inner: Arc<ConnectorInner>,
}

impl ClientConnector {
    /// Creates a connector and starts its background threads.
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn CommandTransport>,
        store: Arc<Mutex<ModelStore>>,
    ) -> ClientResult<Self> {
        Self::with_executor(config, transport, store, Arc::new(DirectExecutor))
    }

    /// Creates a connector dispatching responses through `executor`.
    pub fn with_executor(
        config: &ClientConfig,
        transport: Arc<dyn CommandTransport>,
        store: Arc<Mutex<ModelStore>>,
        executor: Arc<dyn UiExecutor>,
    ) -> ClientResult<Self> {
        let batcher = Arc::new(CommandBatcher::new(config)?);
        let inner = Arc::new(ConnectorInner {
            batcher: Arc::clone(&batcher),
            transport,
            store,
            response_handler: ClientResponseHandler::new(config.strict_mode),
            executor,
            exception_handler: RwLock::new(Arc::new(default_exception_handler)),
            poll: Mutex::new(PollState {
                push_enabled: config.push_enabled,
                waiting: false,
            }),
            dispatch: Mutex::new(()),
        });

        let weak = Arc::downgrade(&inner);
        thread::Builder::new()
            .name("dolphin-transmit".into())
            .spawn(move || run_transmit_loop(&batcher, &weak))
            .map_err(|e| ClientError::Thread {
                message: e.to_string(),
            })?;

        Ok(Self { inner })
    }

    /// Sends a command, releasing any outstanding long poll first.
    ///
    /// `handler` is called once the response has been dispatched, before any
    /// later response is. It may lock the store but must not block on other
    /// batches. Commands without a handler are batched with their neighbours.
    pub fn send(&self, command: Command, handler: Option<ResponseHandler>) {
        ConnectorInner::send(&self.inner, command, handler);
    }

    /// Sends a blind command.
    pub fn send_blind(&self, command: Command) {
        self.send(command, None);
    }

    /// Keeps a long poll outstanding while push is enabled.
    pub fn listen(&self) {
        ConnectorInner::listen(&self.inner);
    }

    /// Interrupts the outstanding long poll, if any.
    pub fn release(&self) {
        self.inner.release();
    }

    /// Enables or disables server push.
    pub fn set_push_enabled(&self, enabled: bool) {
        self.inner.poll.lock().push_enabled = enabled;
    }

    /// Returns true if server push is enabled.
    pub fn is_push_enabled(&self) -> bool {
        self.inner.poll.lock().push_enabled
    }

    /// Returns true while a long poll is outstanding.
    pub fn is_waiting(&self) -> bool {
        self.inner.poll.lock().waiting
    }

    /// Replaces the exception handler.
    pub fn set_exception_handler<F>(&self, handler: F)
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        *self.inner.exception_handler.write() = Arc::new(handler);
    }

    /// Returns the model store this connector dispatches into.
    pub fn store(&self) -> &Arc<Mutex<ModelStore>> {
        &self.inner.store
    }

    /// Returns the session id, once assigned.
    pub fn client_id(&self) -> Option<String> {
        self.inner.transport.client_id()
    }

    /// Prepares the transport for a new session.
    pub fn connect(&self) {
        self.inner.transport.connect();
    }

    /// Disables push and forgets the session.
    pub fn disconnect(&self) {
        self.set_push_enabled(false);
        self.inner.transport.disconnect();
    }
}

fn default_exception_handler(err: &ClientError) {
    error!(error = %err, "remoting failure");
}

fn run_transmit_loop(batcher: &CommandBatcher, inner: &Weak<ConnectorInner>) {
    while let Some(batch) = batcher.take_batch() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.process_batch(batch);
    }
    debug!("transmit loop stopped");
}

impl ConnectorInner {
    fn send(this: &Arc<Self>, command: Command, handler: Option<ResponseHandler>) {
        if command != Command::StartLongPoll {
            this.release();
        }
        let entry = match handler {
            Some(handler) => CommandAndHandler::with_handler(command, handler),
            None => CommandAndHandler::blind(command),
        };
        this.batcher.batch(entry);
    }

    fn listen(this: &Arc<Self>) {
        {
            let mut poll = this.poll.lock();
            if !poll.push_enabled || poll.waiting {
                return;
            }
            poll.waiting = true;
        }

        let weak = Arc::downgrade(this);
        let handler: ResponseHandler = Box::new(move |outcome| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.poll.lock().waiting = false;
            match outcome {
                BatchOutcome::Completed(_) => Self::listen(&inner),
                BatchOutcome::Failed(err) => debug!(error = %err, "long poll ended"),
            }
        });
        trace!("issuing long poll");
        Self::send(this, Command::StartLongPoll, Some(handler));
    }

    fn release(&self) {
        {
            let mut poll = self.poll.lock();
            if !poll.waiting {
                return;
            }
            poll.waiting = false;
        }

        trace!("releasing long poll");
        let transport = Arc::clone(&self.transport);
        let spawned = thread::Builder::new()
            .name("dolphin-release".into())
            .spawn(move || {
                if let Err(err) = transport.transmit(&[Command::InterruptLongPoll]) {
                    warn!(error = %err, "failed to release long poll");
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "failed to start release thread");
        }
    }

    fn process_batch(self: Arc<Self>, batch: Vec<CommandAndHandler>) {
        let mut commands = Vec::with_capacity(batch.len());
        let mut handler = None;
        for entry in batch {
            commands.push(entry.command);
            if handler.is_none() {
                handler = entry.handler;
            }
        }

        info!(size = commands.len(), "sending batch");
        for command in &commands {
            trace!(%command, "->");
        }

        match self.transport.transmit(&commands) {
            Ok(response) => {
                let inner = Arc::clone(&self);
                self.executor
                    .execute(Box::new(move || inner.process_results(&response, handler)));
            }
            Err(err) => {
                self.handle_exception(&err);
                if let Some(handler) = handler {
                    self.executor
                        .execute(Box::new(move || handler(BatchOutcome::Failed(err))));
                }
            }
        }
    }

    fn process_results(&self, response: &[Command], handler: Option<ResponseHandler>) {
        debug!(size = response.len(), "server responded");
        let _dispatching = self.dispatch.lock();
        let mut touched: Vec<String> = Vec::new();
        {
            let mut store = self.store.lock();
            for command in response {
                match self.response_handler.dispatch(&mut store, command) {
                    Ok(Some(model_id)) => {
                        if !touched.contains(&model_id) {
                            touched.push(model_id);
                        }
                    }
                    Ok(None) => {}
                    Err(err) => self.handle_exception(&err),
                }
            }
        }
        if let Some(handler) = handler {
            handler(BatchOutcome::Completed(touched));
        }
    }

    fn handle_exception(&self, err: &ClientError) {
        let handler = Arc::clone(&self.exception_handler.read());
        handler(err);
    }
}

impl Drop for ConnectorInner {
    fn drop(&mut self) {
        self.batcher.close();
    }
}
