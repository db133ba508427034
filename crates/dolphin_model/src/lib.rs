//! # Dolphin Model
//!
//! Presentation models and the model store shared by the client and the
//! server side of Dolphin remoting.
//!
//! This crate provides:
//! - [`Attribute`] and [`PresentationModel`], the synchronized data unit
//! - [`ModelStore`], indexed by model id, type, attribute id and qualifier
//! - A change feed publishing every store mutation in order
//! - [`BeanSchema`] and [`SchemaRegistry`] for typed beans over models
//!
//! ## Key Invariants
//!
//! - Model ids and attribute ids are unique within a store
//! - All attributes sharing a qualifier hold the same value
//! - Attribute ids minted by the client and the server never collide

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attribute;
mod bean;
mod change_feed;
mod error;
mod id;
mod presentation_model;
mod store;

pub use attribute::Attribute;
pub use bean::{BeanSchema, PropertyKind, PropertySchema, SchemaRegistry};
pub use change_feed::{ChangeFeed, StoreChange, StoreEvent, ValueChange};
pub use error::{ModelError, ModelResult};
pub use id::{IdGenerator, CLIENT_SUFFIX, SERVER_SUFFIX};
pub use presentation_model::{PresentationModel, PresentationModelBuilder};
pub use store::ModelStore;
