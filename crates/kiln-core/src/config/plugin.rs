//! Plugin declarations as they appear in the input configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of the `plugins` list.
///
/// ```toml
/// plugins = ["analyze", ["@acme", { strict = true }]]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginEntry {
    /// A bare plugin name, loaded with empty options.
    Name(String),
    /// A plugin name paired with its options object.
    WithOptions(String, Value),
}

impl PluginEntry {
    /// The plugin reference string.
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::WithOptions(name, _) => name,
        }
    }

    /// The options passed to the plugin factory.
    pub fn options(&self) -> Value {
        match self {
            Self::Name(_) => Value::Object(Default::default()),
            Self::WithOptions(_, options) => options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_and_paired_entries() {
        let entries: Vec<PluginEntry> =
            serde_json::from_str(r#"["analyze", ["@acme", {"strict": true}]]"#).unwrap();

        assert_eq!(entries[0], PluginEntry::Name("analyze".to_string()));
        assert_eq!(entries[0].options(), serde_json::json!({}));
        assert_eq!(entries[1].name(), "@acme");
        assert_eq!(entries[1].options(), serde_json::json!({"strict": true}));
    }
}
