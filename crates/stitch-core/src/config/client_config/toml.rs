//! TOML serializer for target configuration files.
//!
//! Edits of an existing file go through `toml_edit`, so comments, native datetimes and
//! layout of everything the edit does not touch stay byte-identical.

use serde_json::{Map, Value};
use toml_edit::{DocumentMut, InlineTable, Item, Table, TableLike};

use super::{ConfigFormat, ConfigSerializer, FormatError};

/// TOML configuration file serializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TomlSerializer;

impl ConfigSerializer for TomlSerializer {
    fn parse(&self, content: &str) -> Result<Map<String, Value>, FormatError> {
        let toml_value: toml::Value =
            toml::from_str(content).map_err(|e| FormatError(e.to_string()))?;

        toml_to_json_map(toml_value)
    }

    fn render(&self, map: &Map<String, Value>) -> Result<String, FormatError> {
        let toml_value = json_map_to_toml(map)?;
        toml::to_string_pretty(&toml_value).map_err(|e| FormatError(e.to_string()))
    }

    fn render_edit(
        &self,
        original: &str,
        baseline: &Map<String, Value>,
        updated: &Map<String, Value>,
    ) -> Result<String, FormatError> {
        let mut doc: DocumentMut = original
            .parse()
            .map_err(|e: toml_edit::TomlError| FormatError(e.to_string()))?;
        sync_table(doc.as_table_mut(), baseline, updated)?;
        Ok(doc.to_string())
    }

    fn format(&self) -> ConfigFormat {
        ConfigFormat::Toml
    }
}

/// Apply the difference between `baseline` and `updated` to `table`.
///
/// Keys equal in both maps are left alone, including ones whose JSON form is lossy
/// (datetimes). Changed sub-maps recurse so sibling entries keep their formatting.
fn sync_table(
    table: &mut dyn TableLike,
    baseline: &Map<String, Value>,
    updated: &Map<String, Value>,
) -> Result<(), FormatError> {
    for key in baseline.keys() {
        if !updated.contains_key(key) {
            table.remove(key);
        }
    }

    for (key, value) in updated {
        let before = baseline.get(key);
        if before == Some(value) {
            continue;
        }
        if let (Some(Value::Object(before)), Value::Object(after)) = (before, value)
            && let Some(nested) = table.get_mut(key).and_then(|item| item.as_table_like_mut())
        {
            sync_table(nested, before, after)?;
            continue;
        }
        let Some(item) = json_to_item(value)? else {
            table.remove(key);
            continue;
        };
        if let Some(existing) = table.get_mut(key) {
            replace_keeping_decor(existing, item);
        } else {
            table.insert(key, item);
        }
    }
    Ok(())
}

/// Replace in place so the key keeps its comments; the new value or table header
/// inherits the old one's decoration.
fn replace_keeping_decor(existing: &mut Item, item: Item) {
    // Inside inline tables a replacement must stay inline.
    let mut item = if existing.is_value() {
        item.into_value().map_or_else(|item| item, Item::Value)
    } else {
        item
    };
    match (&*existing, &mut item) {
        (Item::Value(old), Item::Value(new)) => *new.decor_mut() = old.decor().clone(),
        (Item::Table(old), Item::Table(new)) => *new.decor_mut() = old.decor().clone(),
        _ => {}
    }
    *existing = item;
}

/// Objects become standard tables; a table holding only tables stays implicit so no
/// empty `[parent]` header is written.
fn json_to_item(json_value: &Value) -> Result<Option<Item>, FormatError> {
    let Value::Object(obj) = json_value else {
        return Ok(json_to_edit_value(json_value)?.map(Item::Value));
    };
    let mut table = Table::new();
    for (key, value) in obj {
        if let Some(item) = json_to_item(value)? {
            table.insert(key, item);
        }
    }
    table.set_implicit(!obj.is_empty() && obj.values().all(Value::is_object));
    Ok(Some(Item::Table(table)))
}

fn json_to_edit_value(json_value: &Value) -> Result<Option<toml_edit::Value>, FormatError> {
    let converted = match json_value {
        Value::Null => return Ok(None),
        Value::Bool(b) => toml_edit::Value::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                toml_edit::Value::from(i)
            } else if let Some(f) = n.as_f64() {
                toml_edit::Value::from(f)
            } else {
                return Err(FormatError(format!("Unsupported number: {}", n)));
            }
        }
        Value::String(s) => toml_edit::Value::from(s.as_str()),
        Value::Array(arr) => {
            let mut items = toml_edit::Array::new();
            for item in arr {
                match json_to_edit_value(item)? {
                    Some(value) => items.push(value),
                    None => {
                        return Err(FormatError(
                            "TOML arrays cannot contain null values".to_string(),
                        ));
                    }
                }
            }
            toml_edit::Value::Array(items)
        }
        Value::Object(obj) => {
            let mut inline = InlineTable::new();
            for (key, value) in obj {
                if let Some(value) = json_to_edit_value(value)? {
                    inline.insert(key.as_str(), value);
                }
            }
            toml_edit::Value::InlineTable(inline)
        }
    };
    Ok(Some(converted))
}

/// Convert a TOML value to a JSON-compatible map.
fn toml_to_json_map(toml_value: toml::Value) -> Result<Map<String, Value>, FormatError> {
    match toml_value {
        toml::Value::Table(table) => {
            let mut map = Map::new();
            for (key, value) in table {
                map.insert(key, toml_to_json_value(value));
            }
            Ok(map)
        }
        _ => Err(FormatError("Expected TOML table at root".to_string())),
    }
}

/// Convert a single TOML value to a JSON value.
fn toml_to_json_value(toml_value: toml::Value) -> Value {
    match toml_value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => {
            // serde_json::Number doesn't support NaN/Infinity, fall back to string
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string()))
        }
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json_value).collect()),
        toml::Value::Table(table) => {
            let mut map = Map::new();
            for (key, value) in table {
                map.insert(key, toml_to_json_value(value));
            }
            Value::Object(map)
        }
    }
}

/// Convert a JSON-compatible map to a TOML value. Null entries have no TOML
/// representation and are dropped.
fn json_map_to_toml(map: &Map<String, Value>) -> Result<toml::Value, FormatError> {
    let mut table = toml::map::Map::new();
    for (key, value) in map {
        if let Some(converted) = json_to_toml_value(value)? {
            table.insert(key.clone(), converted);
        }
    }
    Ok(toml::Value::Table(table))
}

fn json_to_toml_value(json_value: &Value) -> Result<Option<toml::Value>, FormatError> {
    let converted = match json_value {
        Value::Null => return Ok(None),
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                toml::Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                toml::Value::Float(f)
            } else {
                return Err(FormatError(format!("Unsupported number: {}", n)));
            }
        }
        Value::String(s) => toml::Value::String(s.clone()),
        Value::Array(arr) => {
            let mut items = Vec::with_capacity(arr.len());
            for item in arr {
                match json_to_toml_value(item)? {
                    Some(value) => items.push(value),
                    None => {
                        return Err(FormatError(
                            "TOML arrays cannot contain null values".to_string(),
                        ));
                    }
                }
            }
            toml::Value::Array(items)
        }
        Value::Object(obj) => json_map_to_toml(obj)?,
    };
    Ok(Some(converted))
}
