use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Flat JSON object used for node data, variable deltas and script results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed read of a top-level key.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set<T: Into<Value>>(
        &mut self,
        key: &str,
        value: T,
    ) {
        self.inner.insert(key.to_string(), value.into());
    }

    pub fn with<T: Into<Value>>(
        mut self,
        key: &str,
        value: T,
    ) -> Self {
        self.set(key, value);
        self
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.inner
    }
}

impl Deref for Vars {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Vars {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl From<Value> for Vars {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            _ => Self::default(),
        }
    }
}

impl From<Map<String, Value>> for Vars {
    fn from(inner: Map<String, Value>) -> Self {
        Self {
            inner,
        }
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Vars;

    #[test]
    fn test_vars_typed_access() {
        let vars = Vars::new().with("name", "Ana").with("age", 31);
        assert_eq!(vars.get::<String>("name"), Some("Ana".to_string()));
        assert_eq!(vars.get::<i64>("age"), Some(31));
        assert_eq!(vars.get::<i64>("name"), None);
        assert_eq!(vars.get::<String>("missing"), None);
    }

    #[test]
    fn test_vars_from_non_object_is_empty() {
        assert!(Vars::from(json!([1, 2])).is_empty());
        let vars = Vars::from(json!({"a": 1}));
        assert_eq!(serde_json::Value::from(vars), json!({"a": 1}));
    }
}
