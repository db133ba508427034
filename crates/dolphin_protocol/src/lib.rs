//! # Dolphin Protocol
//!
//! Wire protocol types and the JSON codec for Dolphin remoting.
//!
//! This crate provides:
//! - [`Value`], the dynamically typed attribute payload
//! - [`Command`], the command vocabulary exchanged by client and server
//! - [`JsonCodec`] for ordered command batches
//! - HTTP exchange types and the reserved header/bean names
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ```
//! use dolphin_protocol::{Codec, Command, JsonCodec};
//!
//! let body = JsonCodec.encode(&[Command::CreateContext]).unwrap();
//! assert_eq!(body, r#"[{"id":"CreateContext"}]"#);
//! assert_eq!(JsonCodec.decode(&body).unwrap(), vec![Command::CreateContext]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod command;
mod error;
mod http;
pub mod platform;
mod value;

pub use codec::{Codec, JsonCodec};
pub use command::{ActionParam, AttributeDto, Command, CommandKind};
pub use error::{CodecError, CodecResult};
pub use http::{status, HttpResponse, CLIENT_ID_HEADER, DEFAULT_ENDPOINT, JSON_MIME_TYPE};
pub use value::Value;
