use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{flow::template, runtime::VariableContext};

/// Comparison operator of a condition rule.
///
/// Anything unrecognised compares as `==`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Gt,
    Lt,
    Contains,
}

impl From<String> for Operator {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "!=" | "ne" | "neq" | "not_equals" => Operator::Ne,
            ">" | "gt" => Operator::Gt,
            "<" | "lt" => Operator::Lt,
            "contains" => Operator::Contains,
            _ => Operator::Eq,
        }
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Contains => "contains",
        }
        .to_string()
    }
}

/// One rule of a condition node. `id` is also the handle of its branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub id: String,
    pub variable: String,
    #[serde(default)]
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Empty text counts as zero, anything unparsable is NaN so every ordering
/// comparison with it is false.
fn to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    if let Ok(n) = s.parse::<f64>() {
        return n;
    }
    // decimal comma
    if !s.contains('.') {
        if let Ok(n) = s.replace(',', ".").parse::<f64>() {
            return n;
        }
    }
    f64::NAN
}

fn variable_name(raw: &str) -> &str {
    let raw = raw.trim();
    raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')).map(str::trim).unwrap_or(raw)
}

/// Evaluate one rule. A missing variable reads as empty text.
pub fn evaluate_condition(
    cond: &Condition,
    vars: &VariableContext,
) -> bool {
    let actual = vars.get(variable_name(&cond.variable)).and_then(template::render).unwrap_or_default();
    let expected = match &cond.value {
        Value::String(s) => vars.interpolate(s),
        v => template::render(v).unwrap_or_default(),
    };

    match cond.operator {
        Operator::Eq => normalize(&actual) == normalize(&expected),
        Operator::Ne => normalize(&actual) != normalize(&expected),
        Operator::Contains => normalize(&actual).contains(&normalize(&expected)),
        Operator::Gt => to_number(&actual) > to_number(&expected),
        Operator::Lt => to_number(&actual) < to_number(&expected),
    }
}

/// First rule that holds, in declaration order.
pub fn first_match<'a>(
    conds: &'a [Condition],
    vars: &VariableContext,
) -> Option<&'a Condition> {
    conds.iter().find(|c| evaluate_condition(c, vars))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::common::Vars;

    fn vars(v: Value) -> VariableContext {
        VariableContext::new(Vars::from(v))
    }

    fn cond(
        id: &str,
        variable: &str,
        operator: &str,
        value: Value,
    ) -> Condition {
        serde_json::from_value(json!({"id": id, "variable": variable, "operator": operator, "value": value})).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![cond("c1", "plan", "==", json!("gold")), cond("c2", "plan", "!=", json!("free"))];
        let m = first_match(&rules, &vars(json!({"plan": "gold"}))).unwrap();
        assert_eq!(m.id, "c1");

        let m = first_match(&rules, &vars(json!({"plan": "silver"}))).unwrap();
        assert_eq!(m.id, "c2");

        assert!(first_match(&rules[..1], &vars(json!({"plan": "free"}))).is_none());
    }

    #[test]
    fn test_string_compare_is_trimmed_and_case_insensitive() {
        let ctx = vars(json!({"answer": "  SIM "}));
        assert!(evaluate_condition(&cond("", "answer", "==", json!("sim")), &ctx));
        assert!(evaluate_condition(&cond("", "answer", "contains", json!("Si")), &ctx));
        assert!(!evaluate_condition(&cond("", "answer", "!=", json!("sim")), &ctx));
    }

    #[test]
    fn test_unknown_operator_falls_back_to_eq() {
        let rule = cond("", "x", "startsWith", json!("abc"));
        assert_eq!(rule.operator, Operator::Eq);
        assert!(evaluate_condition(&rule, &vars(json!({"x": "ABC"}))));
        assert!(!evaluate_condition(&rule, &vars(json!({"x": "abcd"}))));
    }

    #[test]
    fn test_missing_variable_is_empty_string() {
        let ctx = vars(json!({}));
        assert!(evaluate_condition(&cond("", "nope", "==", json!("")), &ctx));
        assert!(evaluate_condition(&cond("", "nope", "!=", json!("x")), &ctx));
        // empty counts as zero
        assert!(evaluate_condition(&cond("", "nope", "<", json!(1)), &ctx));
    }

    #[test]
    fn test_numeric_compare() {
        let ctx = vars(json!({"age": "18", "score": 7.5, "price": "10,5", "name": "ana"}));
        assert!(evaluate_condition(&cond("", "age", ">", json!("17")), &ctx));
        assert!(!evaluate_condition(&cond("", "age", ">", json!(18)), &ctx));
        assert!(evaluate_condition(&cond("", "score", "<", json!(8)), &ctx));
        assert!(evaluate_condition(&cond("", "price", ">", json!(10)), &ctx));
        assert!(!evaluate_condition(&cond("", "name", ">", json!(1)), &ctx));
        assert!(!evaluate_condition(&cond("", "name", "<", json!(1)), &ctx));
        // string compare of "10" and "10.0" differs, numeric does not
        assert!(!evaluate_condition(&cond("", "age", "==", json!("18.0")), &ctx));
    }

    #[test]
    fn test_value_and_variable_forms() {
        let ctx = vars(json!({"a": "x", "b": "X", "user": {"plan": "gold"}}));
        assert!(evaluate_condition(&cond("", "a", "==", json!("{b}")), &ctx));
        assert!(evaluate_condition(&cond("", "{user.plan}", "==", json!("gold")), &ctx));
        assert!(evaluate_condition(&cond("", "flag", "==", json!(null)), &vars(json!({}))));
    }
}
