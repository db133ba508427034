//! # Dolphin Testkit
//!
//! Test utilities for Dolphin remoting.
//!
//! This crate provides:
//! - Fixture controllers and schemas, and an in-process client/server pair
//! - Property-based test generators using proptest
//! - Wire-format test vectors for every command kind
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dolphin_testkit::prelude::*;
//!
//! #[test]
//! fn counter_counts() {
//!     let server = fixture_server(ServerConfig::default()).unwrap();
//!     let client = connected_client(&server, false).unwrap();
//!     let counter = client.create_controller(COUNTER_CONTROLLER).unwrap();
//!     counter.invoke("increment", Vec::new()).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
    pub use dolphin_server::ServerConfig;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
