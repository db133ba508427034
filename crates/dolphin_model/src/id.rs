//! Id generation for models and attributes.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Suffix of attribute ids generated on the client.
pub const CLIENT_SUFFIX: &str = "C";

/// Suffix of attribute ids generated on the server.
pub const SERVER_SUFFIX: &str = "S";

/// Generates attribute ids and model ids for one store.
///
/// Attribute ids are a per-store counter followed by a side suffix, so ids
/// minted by the client and by the server never collide.
#[derive(Debug)]
pub struct IdGenerator {
    counter: AtomicU64,
    suffix: &'static str,
}

impl IdGenerator {
    /// Creates a generator with the given suffix.
    pub fn new(suffix: &'static str) -> Self {
        Self {
            counter: AtomicU64::new(0),
            suffix,
        }
    }

    /// Creates the client-side generator.
    pub fn client() -> Self {
        Self::new(CLIENT_SUFFIX)
    }

    /// Creates the server-side generator.
    pub fn server() -> Self {
        Self::new(SERVER_SUFFIX)
    }

    /// Returns the next attribute id.
    pub fn next_attribute_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n}{}", self.suffix)
    }

    /// Returns a fresh random model id.
    pub fn next_model_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Returns the side suffix.
    pub fn suffix(&self) -> &'static str {
        self.suffix
    }
}
