use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::AdapterError;

/// Per-record parameter lookup, addressed by parameter name and item index.
/// The host driving the adapter decides where values come from; the request
/// builder treats this as a pure accessor.
pub trait ParameterSource: Send + Sync {
    fn value(&self, name: &str, item: usize) -> Option<&Value>;
}

/// JSON-backed parameter source: a shared map applying to every item, plus
/// optional per-item overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemParameters {
    #[serde(default)]
    shared: Map<String, Value>,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

impl ItemParameters {
    pub fn new(shared: Map<String, Value>, items: Vec<Map<String, Value>>) -> Self {
        Self { shared, items }
    }

    /// Builds a source from a single JSON object applying to all items.
    pub fn shared(value: Value) -> Self {
        match value {
            Value::Object(map) => Self {
                shared: map,
                items: Vec::new(),
            },
            _ => Self::default(),
        }
    }
}

impl ParameterSource for ItemParameters {
    fn value(&self, name: &str, item: usize) -> Option<&Value> {
        self.items
            .get(item)
            .and_then(|overrides| overrides.get(name))
            .or_else(|| self.shared.get(name))
    }
}

/// Typed accessors over a parameter source, bound to one item index.
pub struct Params<'a> {
    source: &'a dyn ParameterSource,
    item: usize,
}

impl<'a> Params<'a> {
    pub fn new(source: &'a dyn ParameterSource, item: usize) -> Self {
        Self { source, item }
    }

    pub fn item(&self) -> usize {
        self.item
    }

    fn raw(&self, name: &str) -> Option<&Value> {
        self.source.value(name, self.item)
    }

    pub fn opt_str(&self, name: &str) -> Option<String> {
        self.raw(name).and_then(value_to_string)
    }

    pub fn required_str(&self, name: &str) -> Result<String, AdapterError> {
        self.opt_str(name)
            .ok_or_else(|| AdapterError::missing_parameter(name, self.item))
    }

    pub fn str_or(&self, name: &str, default: &str) -> String {
        self.opt_str(name).unwrap_or_else(|| default.to_string())
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.raw(name).and_then(Value::as_bool).unwrap_or(default)
    }

    pub fn opt_u64(&self, name: &str) -> Option<u64> {
        self.raw(name).and_then(Value::as_u64)
    }

    pub fn required_u64(&self, name: &str) -> Result<u64, AdapterError> {
        self.opt_u64(name)
            .ok_or_else(|| AdapterError::missing_parameter(name, self.item))
    }

    /// Collection parameters ("options", "additionalFields", ...) default
    /// to an empty object when absent.
    pub fn object(&self, name: &str) -> Map<String, Value> {
        match self.raw(name) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// Stringifies scalar parameter values; numbers are accepted wherever the
/// wire format wants text (share recipients, offsets).
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn per_item_values_override_shared_ones() {
        let params = ItemParameters::new(
            as_map(json!({"path": "/shared.txt", "flag": true})),
            vec![
                as_map(json!({})),
                as_map(json!({"path": "/second.txt"})),
            ],
        );

        let first = Params::new(&params, 0);
        assert_eq!(first.required_str("path").unwrap(), "/shared.txt");
        assert!(first.bool_or("flag", false));

        let second = Params::new(&params, 1);
        assert_eq!(second.required_str("path").unwrap(), "/second.txt");
    }

    #[test]
    fn missing_required_parameter_is_a_config_error() {
        let params = ItemParameters::shared(json!({}));
        let err = Params::new(&params, 3).required_str("path").unwrap_err();
        assert!(err.to_string().contains("path"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn numbers_stringify_for_text_parameters() {
        let params = ItemParameters::shared(json!({"circleId": 42}));
        assert_eq!(
            Params::new(&params, 0).required_str("circleId").unwrap(),
            "42"
        );
    }

    #[test]
    fn absent_collections_default_to_empty() {
        let params = ItemParameters::shared(json!({}));
        assert!(Params::new(&params, 0).object("options").is_empty());
    }
}
