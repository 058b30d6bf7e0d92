//! CLI commands

use serde_json::Value;

pub mod connect_agent;
pub mod describe;
pub mod register;
pub mod unregister;

/// Print a JSON document to stdout
pub(crate) fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
