//! Decode command implementation.

use dolphin_protocol::{Codec, Command, JsonCodec};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Decoded command batch.
#[derive(Debug, Serialize)]
pub struct DecodeResult {
    /// File the batch was read from.
    pub path: String,
    /// Number of entries in the JSON array.
    pub entry_count: usize,
    /// Entries skipped because their command id is unknown.
    pub skipped: usize,
    /// Number of commands per wire id.
    pub kinds: BTreeMap<String, usize>,
    /// One line per decoded command.
    pub commands: Vec<String>,
}

/// Reads and decodes a command batch file.
pub fn decode_file(path: &Path) -> Result<DecodeResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No command file found at {:?}", path).into());
    }
    let body = std::fs::read_to_string(path)?;
    let commands = JsonCodec::new().decode(&body)?;
    let entry_count = serde_json::from_str::<Vec<serde_json::Value>>(&body)?.len();
    Ok(summarize(path, entry_count, &commands))
}

fn summarize(path: &Path, entry_count: usize, commands: &[Command]) -> DecodeResult {
    let mut kinds = BTreeMap::new();
    for command in commands {
        *kinds.entry(command.kind().id().to_string()).or_insert(0) += 1;
    }
    DecodeResult {
        path: path.display().to_string(),
        entry_count,
        skipped: entry_count.saturating_sub(commands.len()),
        kinds,
        commands: commands.iter().map(ToString::to_string).collect(),
    }
}

/// Runs the decode command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = decode_file(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "text" => print_text(&result),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

fn print_text(result: &DecodeResult) {
    println!("Command batch: {}", result.path);
    println!("  Entries: {}", result.entry_count);
    if result.skipped > 0 {
        println!("  Skipped: {} (unknown command id)", result.skipped);
    }
    println!();
    for (i, command) in result.commands.iter().enumerate() {
        println!("  [{i}] {command}");
    }
    println!();
    println!("By kind:");
    for (kind, count) in &result.kinds {
        println!("  {kind}: {count}");
    }
}
