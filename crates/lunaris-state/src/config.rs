//! Per-instance configuration.

use serde::Deserialize;

/// Settings applied when a [`LuaState`](crate::LuaState) is created.
///
/// Every field has a default, so a partial TOML/JSON document deserializes
/// cleanly.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
    /// Open the standard libraries (`string`, `table`, `math`, ...).
    pub open_stdlibs: bool,
    /// Number of released registry keys queued before they are freed
    /// without waiting for an explicit collection.
    pub registry_flush_threshold: usize,
    /// Maximum table nesting accepted by the JSON encoder.
    pub json_max_depth: usize,
    /// Prefix for chunk names that do not start with `=` or `@`.
    pub chunk_prefix: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        StateConfig {
            open_stdlibs: true,
            registry_flush_threshold: 64,
            json_max_depth: 64,
            chunk_prefix: "=".to_string(),
        }
    }
}

impl StateConfig {
    /// The chunk name handed to the interpreter for a user-supplied name.
    pub fn chunk_name(&self, name: &str) -> String {
        if name.starts_with('=') || name.starts_with('@') {
            name.to_string()
        } else {
            format!("{}{}", self.chunk_prefix, name)
        }
    }
}
