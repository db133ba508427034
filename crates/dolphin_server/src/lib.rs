//! # Dolphin Server
//!
//! Server side of the Dolphin presentation-model remoting protocol.
//!
//! This crate provides:
//! - Per-session model store that records every change as a response command
//! - Typed bean access checked against registered schemas
//! - Reference-counting garbage collection of unreachable beans
//! - Controller registration, instantiation and action dispatch
//! - Long-poll task queues and a topic-based event bus for server push
//! - A transport-agnostic request handler ([`DolphinServer`])
//!
//! # Architecture
//!
//! ```text
//! HTTP POST ──► DolphinServer ──► Session ──► DolphinContext
//!                                               ├── BeanManager
//!                                               │     ├── ServerModelStore
//!                                               │     └── GarbageCollector
//!                                               ├── ControllerHandler
//!                                               └── TaskQueue ◄── EventBus / run_later
//! ```
//!
//! Each session's context sits behind its own mutex and is only touched by
//! the thread serving that session's current request. Other threads reach a
//! session through its [`SessionHandle`], which only queues tasks or
//! interrupts the long poll.
//!
//! # Key Invariants
//!
//! - Commands of one request are handled in order; the response carries
//!   the resulting changes in the order they were made.
//! - Controller commands before `CreateContext` fail with `NotInitialized`.
//! - A failing action sets the action-call bean's error flag; the session
//!   survives.
//! - The reference graph between beans stays acyclic.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod bean_manager;
mod config;
mod context;
mod controller;
mod controller_handler;
mod error;
mod event_bus;
mod gc;
mod model_store;
mod server;
mod task_queue;

pub use bean_manager::BeanManager;
pub use config::{
    ServerConfig, DEFAULT_GC_MAX_REMOVALS, DEFAULT_MAX_POLL_TIME, DEFAULT_MAX_SESSIONS,
    DEFAULT_SESSION_TIMEOUT,
};
pub use context::DolphinContext;
pub use controller::{
    ActionContext, ActionParams, ContainerManager, ControllerBuilder, ControllerInstance,
    ControllerRegistry, ControllerType, DefaultContainerManager,
};
pub use controller_handler::ControllerHandler;
pub use error::{ServerError, ServerResult};
pub use event_bus::{EventBus, EventHandler, SubscriptionId};
pub use gc::{GarbageCollector, GcStats, VetoHandler};
pub use model_store::ServerModelStore;
pub use server::{DolphinServer, ServerBuilder, SessionListener};
pub use task_queue::{SessionHandle, Task, TaskQueue};
