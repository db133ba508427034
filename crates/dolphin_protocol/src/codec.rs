//! JSON codec for command batches.

use crate::command::{Command, CommandKind};
use crate::error::{CodecError, CodecResult};
use tracing::{trace, warn};

/// Encodes and decodes ordered command batches.
///
/// Implementations must preserve command order in both directions.
pub trait Codec: Send + Sync {
    /// Encodes a batch into a request or response body.
    fn encode(&self, commands: &[Command]) -> CodecResult<String>;

    /// Decodes a request or response body into a batch.
    fn decode(&self, body: &str) -> CodecResult<Vec<Command>>;
}

/// The JSON array codec used on the wire.
///
/// Entries whose `id` is not part of the command vocabulary are logged and
/// skipped; the rest of the batch is still decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Creates a codec.
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JsonCodec {
    fn encode(&self, commands: &[Command]) -> CodecResult<String> {
        serde_json::to_string(commands).map_err(|e| CodecError::EncodingFailed {
            message: e.to_string(),
        })
    }

    fn decode(&self, body: &str) -> CodecResult<Vec<Command>> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let parsed: serde_json::Value =
            serde_json::from_str(body).map_err(|e| CodecError::invalid_json(e.to_string()))?;
        let entries = match parsed {
            serde_json::Value::Array(entries) => entries,
            other => {
                return Err(CodecError::invalid_structure(format!(
                    "expected an array of commands, found {}",
                    json_type_name(&other)
                )))
            }
        };

        let mut commands = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let id = entry
                .get("id")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    CodecError::invalid_structure(format!("command #{index} has no string id"))
                })?;

            if CommandKind::from_id(id).is_none() {
                warn!(command_id = %id, index, "skipping unknown command");
                continue;
            }

            let command: Command = serde_json::from_value(entry).map_err(|e| {
                CodecError::invalid_structure(format!("command #{index}: {e}"))
            })?;
            trace!(%command, "decoded command");
            commands.push(command);
        }
        Ok(commands)
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
