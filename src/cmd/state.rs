//! Dot-path access to the state document: `get`, `set`, `step`.

use anyhow::{Context, Result, bail};
use serde_json::Value;

use specflow::config::SpecflowConfig;
use specflow::state::{
    StateStore, StepName, StepStatus, coerce_value_for_schema, get_value, lookup_field, set_value,
};

pub fn cmd_get(config: &SpecflowConfig, path: Option<&str>) -> Result<()> {
    let doc = StateStore::new(config.paths.state_source()).read_value()?;
    let path = path.unwrap_or_default();
    let Some(value) = get_value(&doc, path) else {
        bail!("No value at '{}'", path);
    };
    match value {
        Value::String(s) => println!("{}", s),
        Value::Null => println!("null"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

/// Text from the command line; JSON objects and arrays are parsed as such.
fn parse_cli_value(raw: &str) -> Result<Value> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str(raw).context("Value looks like JSON but does not parse");
    }
    Ok(Value::String(raw.to_string()))
}

pub fn cmd_set(config: &SpecflowConfig, path: &str, raw: &str) -> Result<()> {
    if path.trim().is_empty() {
        bail!("A dot-path is required");
    }
    if lookup_field(path).is_none() {
        // Unknown top-level keys are kept verbatim; unknown keys inside a
        // typed section would be dropped on the next write.
        let section = path.split('.').next().unwrap_or_default();
        if lookup_field(section).is_some() {
            bail!("'{}' is not a field of '{}'", path, section);
        }
        tracing::warn!(path, "Path is not part of the state schema; writing it as given");
    }
    let store = config.state_store();
    let doc = store.read_value()?;
    let value = coerce_value_for_schema(path, parse_cli_value(raw)?);
    let updated = set_value(&doc, path, value);
    store
        .write_value(updated)
        .with_context(|| format!("Refusing to write '{}'", path))?;
    println!("{} = {}", path, raw);
    Ok(())
}

pub fn cmd_step(config: &SpecflowConfig, name: &str, status: Option<&str>) -> Result<()> {
    let step: StepName = name.parse()?;
    let status: StepStatus = match status {
        Some(s) => s.parse()?,
        None => StepStatus::InProgress,
    };
    let store = config.state_store();
    if !store.read()?.phase.is_active() {
        bail!("No active phase. Start one with 'specflow phase start'.");
    }
    let state = store.update(|state| state.set_step(step, status))?;
    println!(
        "Step {} ({}/4) [{}]",
        step,
        state.step.index + 1,
        state.step.status
    );
    Ok(())
}
