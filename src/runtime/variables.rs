use serde_json::{Map, Value};

use crate::{common::Vars, flow::template};

/// Variables of one chat session.
///
/// Only actions mutate it, through [`Context`](crate::runtime::Context).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableContext {
    vars: Value,
}

impl VariableContext {
    pub fn new(vars: Vars) -> Self {
        Self {
            vars: vars.into(),
        }
    }

    /// Exact key first, then a dotted or bracketed path.
    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Value> {
        if let Some(v) = self.map().and_then(|m| m.get(name)) {
            return Some(v);
        }
        template::lookup(&self.vars, name)
    }

    pub fn set(
        &mut self,
        name: &str,
        value: Value,
    ) {
        if let Some(map) = self.map_mut() {
            map.insert(name.to_string(), value);
        }
    }

    /// Shallow merge, incoming keys win.
    pub fn merge(
        &mut self,
        delta: Vars,
    ) {
        if let Some(map) = self.map_mut() {
            for (k, v) in delta.into_map() {
                map.insert(k, v);
            }
        }
    }

    pub fn interpolate(
        &self,
        text: &str,
    ) -> String {
        template::interpolate(text, &self.vars)
    }

    pub fn interpolate_json(
        &self,
        value: &Value,
    ) -> Value {
        template::interpolate_json(value, &self.vars)
    }

    pub fn snapshot(&self) -> Vars {
        Vars::from(self.vars.clone())
    }

    fn map(&self) -> Option<&Map<String, Value>> {
        self.vars.as_object()
    }

    fn map_mut(&mut self) -> Option<&mut Map<String, Value>> {
        if !self.vars.is_object() {
            self.vars = Value::Object(Map::new());
        }
        self.vars.as_object_mut()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::VariableContext;
    use crate::common::Vars;

    #[test]
    fn test_get_set_merge() {
        let mut ctx = VariableContext::new(Vars::from(json!({"cliente": {"nome": "Ana"}})));
        assert_eq!(ctx.get("cliente.nome"), Some(&json!("Ana")));
        assert_eq!(ctx.get("missing"), None);

        ctx.set("cpf", json!("123"));
        ctx.merge(Vars::from(json!({"cpf": "456", "plano": "gold"})));
        assert_eq!(ctx.get("cpf"), Some(&json!("456")));
        assert_eq!(ctx.snapshot().get::<String>("plano"), Some("gold".to_string()));
        assert_eq!(ctx.interpolate("{cliente.nome}/{plano}/{x}"), "Ana/gold/{x}");
    }
}
