//! `{path}` placeholders over the session variables.
//!
//! A path is a top-level name followed by `.key`, `[index]` or `["key"]`
//! selectors, e.g. `{cliente.nome}`, `{itens[0].sku}`. Placeholders that do not
//! resolve to a value are kept verbatim.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Format: `{name}`, `{a.b}`, `{a[0]}`
const PLACEHOLDER_PATTERN: &str = r"\{([^{}]+)\}";

static PLACEHOLDER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).ok());

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut chars = path.trim().chars().peekable();
    let mut current = String::new();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if current.is_empty() {
                    // `a..b` or `a[0].` with nothing after the dot is handled below
                    if segments.is_empty() {
                        return None;
                    }
                } else {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut current)));
                }
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return None;
                }
                let inner = inner.trim();
                let quoted = (inner.starts_with('"') && inner.ends_with('"')) || (inner.starts_with('\'') && inner.ends_with('\''));
                if quoted && inner.len() >= 2 {
                    segments.push(Segment::Key(inner[1..inner.len() - 1].to_string()));
                } else {
                    segments.push(Segment::Index(inner.parse().ok()?));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(Segment::Key(current));
    }
    if segments.is_empty() || !matches!(segments[0], Segment::Key(_)) {
        return None;
    }
    Some(segments)
}

/// Walk `path` into `root`.
pub fn lookup<'a>(
    root: &'a Value,
    path: &str,
) -> Option<&'a Value> {
    let segments = parse_path(path)?;
    let mut current = root;
    for segment in segments.iter() {
        current = match (segment, current) {
            (Segment::Key(k), Value::Object(map)) => map.get(k)?,
            (Segment::Key(k), Value::Array(items)) => items.get(k.parse::<usize>().ok()?)?,
            (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
            (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
            _ => return None,
        };
    }
    Some(current)
}

/// Text form of a variable as it appears in messages.
///
/// `None` for null so that callers treat it as unresolved.
pub fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        v => Some(v.to_string()),
    }
}

/// Replace every resolvable `{path}` in `text`.
///
/// `resolve` receives the trimmed path.
pub fn interpolate_with(
    text: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> String {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return text.to_string();
    };
    re.replace_all(text, |caps: &regex::Captures| {
        let path = caps[1].trim();
        resolve(path).unwrap_or_else(|| caps[0].to_string())
    })
    .into_owned()
}

/// Replace every resolvable `{path}` in `text` from `vars`.
pub fn interpolate(
    text: &str,
    vars: &Value,
) -> String {
    interpolate_with(text, |path| resolve_path(vars, path))
}

/// Exact top-level key first, so flat names with dots still resolve.
fn resolve_path(
    vars: &Value,
    path: &str,
) -> Option<String> {
    if let Some(v) = vars.as_object().and_then(|m| m.get(path)) {
        return render(v);
    }
    lookup(vars, path).and_then(render)
}

/// Interpolate every string inside a JSON value.
pub fn interpolate_json(
    value: &Value,
    vars: &Value,
) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, vars)),
        Value::Array(arr) => Value::Array(arr.iter().map(|v| interpolate_json(v, vars)).collect()),
        Value::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), interpolate_json(v, vars))).collect()),
        _ => value.clone(),
    }
}
