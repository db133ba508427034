//! # Dolphin Client
//!
//! Client side of the Dolphin presentation-model remoting protocol.
//!
//! This crate provides:
//! - Blind command batching with optional value-change merging
//! - The connector: transmit thread, response dispatch and long polling
//! - HTTP transport abstraction with a loopback client
//! - `ClientContext` facade and controller proxies
//!
//! ## Architecture
//!
//! Local mutations go into the client [`ModelStore`](dolphin_model::ModelStore)
//! and out as commands. The connector batches them, sends each batch through
//! a [`CommandTransport`] and dispatches the server's response commands back
//! into the store before the batch handler runs.
//!
//! ## Key Invariants
//!
//! - Batches are sent in the order they were formed
//! - A batch carries at most one response handler
//! - At most one long poll is outstanding; any other command releases it
//! - Changes received from the server are never echoed back

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batcher;
mod config;
mod connector;
mod context;
mod error;
mod http;
mod response_handler;
mod transport;

pub use batcher::{BatchOutcome, CommandAndHandler, CommandBatcher, ResponseHandler};
pub use config::{
    ClientConfig, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_DEFER_WINDOW, DEFAULT_MAX_BATCH_SIZE,
};
pub use connector::{ClientConnector, DirectExecutor, ExceptionHandler, UiExecutor};
pub use context::{ClientContext, ControllerProxy};
pub use error::{ClientError, ClientResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use response_handler::ClientResponseHandler;
pub use transport::{CommandTransport, MockTransport};
