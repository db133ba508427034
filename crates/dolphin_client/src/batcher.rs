//! Blind command batching.
//!
//! Commands without a result handler ("blind" commands) are collected for a
//! short defer window and sent together. The window restarts on every new
//! arrival, but never more than `max_batch_size` times in a row, and a batch
//! is closed early once it holds `max_batch_size` commands.
//!
//! A command with a handler flushes the batcher: all blind commands queued
//! before it are sent first, then the handler command travels alone. Every
//! outgoing batch therefore carries at most one handler.
//!
//! ```text
//! batch(blind) ──► pending ──(defer window / size)──► ready ──► take_batch()
//! batch(handler) ─► flush pending, then [handler] ────►
//! ```

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use dolphin_protocol::Command;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Outcome of a batch, as seen by its handler.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The response was dispatched. Carries the ids of the touched models,
    /// without duplicates, in dispatch order.
    Completed(Vec<String>),
    /// The batch could not be transmitted.
    Failed(ClientError),
}

/// Callback invoked once the response to a command has been dispatched.
pub type ResponseHandler = Box<dyn FnOnce(BatchOutcome) + Send>;

/// A command together with its optional response handler.
pub struct CommandAndHandler {
    /// The command.
    pub command: Command,
    /// The handler, or `None` for blind commands.
    pub handler: Option<ResponseHandler>,
}

impl CommandAndHandler {
    /// Creates a blind command.
    pub fn blind(command: Command) -> Self {
        Self {
            command,
            handler: None,
        }
    }

    /// Creates a command with a handler.
    pub fn with_handler(command: Command, handler: ResponseHandler) -> Self {
        Self {
            command,
            handler: Some(handler),
        }
    }

    /// Returns true if this command may be batched with others.
    pub fn is_blind(&self) -> bool {
        self.handler.is_none()
    }
}

impl std::fmt::Debug for CommandAndHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandAndHandler")
            .field("command", &self.command)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

#[derive(Default)]
struct BatcherState {
    pending: VecDeque<CommandAndHandler>,
    ready: VecDeque<Vec<CommandAndHandler>>,
    last_arrival: Option<Instant>,
    closed: bool,
}

struct Shared {
    state: Mutex<BatcherState>,
    /// Signals the deferral thread.
    arrived: Condvar,
    /// Signals consumers of `take_batch`.
    batch_ready: Condvar,
    defer_window: Duration,
    max_batch_size: usize,
    merge_value_changes: bool,
}

/// Collects commands into ordered batches.
///
/// Owns a background thread that closes deferred batches. Dropping the
/// batcher (or calling [`close`](Self::close)) stops it.
pub struct CommandBatcher {
    shared: Arc<Shared>,
}

impl CommandBatcher {
    /// Creates a batcher and starts its deferral thread.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(BatcherState::default()),
            arrived: Condvar::new(),
            batch_ready: Condvar::new(),
            defer_window: config.defer_window,
            max_batch_size: config.max_batch_size.max(1),
            merge_value_changes: config.merge_value_changes,
        });

        let worker = Arc::clone(&shared);
        thread::Builder::new()
            .name("dolphin-batcher".into())
            .spawn(move || worker.run_deferral())
            .map_err(|e| ClientError::Thread {
                message: e.to_string(),
            })?;

        Ok(Self { shared })
    }

    /// Queues a command.
    ///
    /// Commands queued after [`close`](Self::close) are dropped; their
    /// handler is told the batch failed.
    pub fn batch(&self, entry: CommandAndHandler) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.closed {
            drop(state);
            trace!(command = %entry.command, "batcher closed, dropping command");
            if let Some(handler) = entry.handler {
                handler(BatchOutcome::Failed(ClientError::NotConnected));
            }
            return;
        }

        trace!(
            command = %entry.command,
            blind = entry.is_blind(),
            "batching command"
        );
        if entry.is_blind() {
            state.pending.push_back(entry);
            if state.pending.len() >= shared.max_batch_size {
                shared.flush_pending(&mut state);
                shared.batch_ready.notify_all();
            } else {
                state.last_arrival = Some(Instant::now());
                shared.arrived.notify_one();
            }
        } else {
            shared.flush_pending(&mut state);
            state.ready.push_back(vec![entry]);
            shared.batch_ready.notify_all();
        }
    }

    /// Takes the next batch, blocking until one is ready.
    ///
    /// Returns `None` once the batcher is closed and drained.
    pub fn take_batch(&self) -> Option<Vec<CommandAndHandler>> {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        loop {
            if let Some(batch) = state.ready.pop_front() {
                return Some(batch);
            }
            if state.closed {
                return None;
            }
            shared.batch_ready.wait(&mut state);
        }
    }

    /// Returns true if no command is queued or waiting to be taken.
    pub fn is_empty(&self) -> bool {
        let state = self.shared.state.lock();
        state.pending.is_empty() && state.ready.is_empty()
    }

    /// Flushes pending blinds and stops accepting commands.
    pub fn close(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.closed {
            return;
        }
        shared.flush_pending(&mut state);
        state.closed = true;
        shared.arrived.notify_all();
        shared.batch_ready.notify_all();
    }
}

impl Drop for CommandBatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn run_deferral(&self) {
        let mut state = self.state.lock();
        loop {
            while state.pending.is_empty() && !state.closed {
                self.arrived.wait(&mut state);
            }
            if state.closed {
                return;
            }

            // Restart the window on every arrival, bounded by max_batch_size rounds.
            let mut rounds = 0;
            while rounds < self.max_batch_size && !state.pending.is_empty() && !state.closed {
                let deadline = state
                    .last_arrival
                    .map_or_else(Instant::now, |t| t + self.defer_window);
                if Instant::now() >= deadline {
                    break;
                }
                self.arrived.wait_until(&mut state, deadline);
                rounds += 1;
            }

            if !state.pending.is_empty() {
                self.flush_pending(&mut state);
                self.batch_ready.notify_all();
            }
        }
    }

    /// Moves all pending blinds into ready batches of at most `max_batch_size`.
    fn flush_pending(&self, state: &mut BatcherState) {
        while !state.pending.is_empty() {
            let mut batch: Vec<CommandAndHandler> = Vec::new();
            while batch.len() < self.max_batch_size {
                let Some(entry) = state.pending.pop_front() else {
                    break;
                };
                if !self.merge_into(&mut batch, &entry.command) {
                    batch.push(entry);
                }
            }
            debug!(size = batch.len(), "blind batch ready");
            state.ready.push_back(batch);
        }
        state.last_arrival = None;
    }

    /// Folds a value change into an earlier one of the same attribute whose
    /// new value equals this change's old value.
    fn merge_into(&self, batch: &mut [CommandAndHandler], command: &Command) -> bool {
        if !self.merge_value_changes {
            return false;
        }
        let Command::ValueChanged {
            attribute_id,
            old_value,
            new_value,
        } = command
        else {
            return false;
        };

        let earlier = batch.iter_mut().find_map(|entry| match &mut entry.command {
            Command::ValueChanged {
                attribute_id: id,
                new_value: earlier_new,
                ..
            } if id == attribute_id && earlier_new == old_value => Some(earlier_new),
            _ => None,
        });
        match earlier {
            Some(earlier_new) => {
                trace!(attribute_id = %attribute_id, new = %new_value, "merging value change");
                *earlier_new = new_value.clone();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dolphin_protocol::Value;
    use std::sync::mpsc;

    fn config(defer_ms: u64, max: usize, merge: bool) -> ClientConfig {
        ClientConfig::default()
            .with_defer_window(Duration::from_millis(defer_ms))
            .with_max_batch_size(max)
            .with_merge_value_changes(merge)
    }

    fn commands(batch: &[CommandAndHandler]) -> Vec<Command> {
        batch.iter().map(|c| c.command.clone()).collect()
    }

    #[test]
    fn blinds_within_window_form_one_batch() {
        let batcher = CommandBatcher::new(&config(50, 100, false)).unwrap();
        let sent: Vec<Command> = (0..5)
            .map(|i| Command::value_changed(format!("{i}C"), Value::Null, i64::from(i)))
            .collect();
        for command in &sent {
            batcher.batch(CommandAndHandler::blind(command.clone()));
        }

        let batch = batcher.take_batch().unwrap();
        assert_eq!(commands(&batch), sent);
        assert!(batcher.is_empty());
    }

    #[test]
    fn handler_command_travels_alone_after_leading_blinds() {
        let batcher = CommandBatcher::new(&config(1_000, 100, false)).unwrap();
        batcher.batch(CommandAndHandler::blind(Command::Empty));
        batcher.batch(CommandAndHandler::blind(Command::CreateContext));
        batcher.batch(CommandAndHandler::with_handler(
            Command::StartLongPoll,
            Box::new(|_: BatchOutcome| {}),
        ));

        let first = batcher.take_batch().unwrap();
        assert_eq!(commands(&first), vec![Command::Empty, Command::CreateContext]);
        assert!(first.iter().all(CommandAndHandler::is_blind));

        let second = batcher.take_batch().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].command, Command::StartLongPoll);
        assert!(!second[0].is_blind());
    }

    #[test]
    fn full_batches_are_released_early() {
        let batcher = CommandBatcher::new(&config(10_000, 3, false)).unwrap();
        for _ in 0..7 {
            batcher.batch(CommandAndHandler::blind(Command::Empty));
        }
        assert_eq!(batcher.take_batch().unwrap().len(), 3);
        assert_eq!(batcher.take_batch().unwrap().len(), 3);
        batcher.close();
        assert_eq!(batcher.take_batch().unwrap().len(), 1);
        assert!(batcher.take_batch().is_none());
    }

    #[test]
    fn merges_chained_value_changes() {
        let batcher = CommandBatcher::new(&config(1_000, 100, true)).unwrap();
        batcher.batch(CommandAndHandler::blind(Command::value_changed("1C", 0i64, 1i64)));
        batcher.batch(CommandAndHandler::blind(Command::value_changed("2C", 0i64, 5i64)));
        batcher.batch(CommandAndHandler::blind(Command::value_changed("1C", 1i64, 2i64)));
        batcher.batch(CommandAndHandler::blind(Command::value_changed("1C", 7i64, 8i64)));
        batcher.close();

        let batch = batcher.take_batch().unwrap();
        assert_eq!(
            commands(&batch),
            vec![
                Command::value_changed("1C", 0i64, 2i64),
                Command::value_changed("2C", 0i64, 5i64),
                Command::value_changed("1C", 7i64, 8i64),
            ]
        );
    }

    #[test]
    fn no_merge_unless_enabled() {
        let batcher = CommandBatcher::new(&config(1_000, 100, false)).unwrap();
        batcher.batch(CommandAndHandler::blind(Command::value_changed("1C", 0i64, 1i64)));
        batcher.batch(CommandAndHandler::blind(Command::value_changed("1C", 1i64, 2i64)));
        batcher.close();
        assert_eq!(batcher.take_batch().unwrap().len(), 2);
    }

    #[test]
    fn closed_batcher_fails_handlers() {
        let batcher = CommandBatcher::new(&config(10, 100, false)).unwrap();
        batcher.close();

        let (tx, rx) = mpsc::channel();
        batcher.batch(CommandAndHandler::with_handler(
            Command::Empty,
            Box::new(move |outcome: BatchOutcome| {
                let _ = tx.send(outcome);
            }),
        ));
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(1)).unwrap(),
            BatchOutcome::Failed(ClientError::NotConnected)
        );
        assert!(batcher.take_batch().is_none());
    }
}
