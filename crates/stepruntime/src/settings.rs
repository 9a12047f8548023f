use std::path::Path;
use stepcore::{ParamMap, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load a TOML file into a settings overlay for a flow.
///
/// Top-level keys become overlay entries; nested tables stay reachable
/// through [`nested_get`].
pub fn load_settings(path: impl AsRef<Path>) -> Result<ParamMap, SettingsError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let table: toml::Table = text.parse()?;
    tracing::info!("Loaded {} settings keys from {}", table.len(), path.display());
    Ok(table
        .into_iter()
        .map(|(key, value)| (key, toml_to_value(value)))
        .collect())
}

/// Like [`load_settings`], but a missing file yields an empty overlay
/// instead of an error.
pub fn load_settings_if_present(path: impl AsRef<Path>) -> Result<ParamMap, SettingsError> {
    if path.as_ref().is_file() {
        load_settings(path)
    } else {
        Ok(ParamMap::new())
    }
}

fn toml_to_value(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(n) => Value::Number(n as f64),
        toml::Value::Float(n) => Value::Number(n),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_value).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_value(value)))
                .collect(),
        ),
    }
}

/// Walk a dotted path like `"retry.count"` through nested objects in an
/// overlay. Returns `None` when any segment is missing or not an object.
pub fn nested_get<'a>(settings: &'a ParamMap, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = settings.get(segments.next()?)?;
    for segment in segments {
        match current {
            Value::Object(fields) => current = fields.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}
