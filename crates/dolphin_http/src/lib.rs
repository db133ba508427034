//! # Dolphin HTTP
//!
//! HTTP bindings for Dolphin remoting.
//!
//! This crate provides:
//! - An axum router exposing a [`DolphinServer`](dolphin_server::DolphinServer)
//!   at its configured endpoint path
//! - [`serve`] and [`serve_listener`] to run that router on Tokio
//! - [`ReqwestClient`], a blocking [`HttpClient`](dolphin_client::HttpClient)
//!   for the client's HTTP transport
//!
//! The session id travels in the `dolphin_platform_intern_dolphinClientId`
//! header in both directions. Requests are handled on Tokio's blocking pool
//! because long polls hold their thread until a task arrives or the poll
//! times out.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod endpoint;
mod error;

pub use client::{ReqwestClient, DEFAULT_REQUEST_TIMEOUT};
pub use endpoint::{router, serve, serve_listener};
pub use error::{HttpError, HttpResult};
