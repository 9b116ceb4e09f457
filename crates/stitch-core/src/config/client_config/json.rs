//! JSON serializer for target configuration files.

use serde_json::{Map, Value};

use super::{ConfigFormat, ConfigSerializer, FormatError};

/// JSON configuration file serializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl ConfigSerializer for JsonSerializer {
    fn parse(&self, content: &str) -> Result<Map<String, Value>, FormatError> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| FormatError(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(FormatError("Expected JSON object at root".to_string())),
        }
    }

    fn render(&self, map: &Map<String, Value>) -> Result<String, FormatError> {
        let mut content =
            serde_json::to_string_pretty(map).map_err(|e| FormatError(e.to_string()))?;
        content.push('\n');
        Ok(content)
    }

    fn format(&self) -> ConfigFormat {
        ConfigFormat::Json
    }
}
