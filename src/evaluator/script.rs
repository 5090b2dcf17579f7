use std::time::{Duration, Instant};

use regex::Regex;
use rquickjs::{Context as JsContext, Runtime as JsRuntime};
use serde_json::Value;

use crate::{ChatflowError, Result, common::Vars};

/// Resource budget of one script run.
#[derive(Debug, Clone, Copy)]
pub struct ScriptLimits {
    pub timeout: Duration,
    pub memory_limit: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1_000),
            memory_limit: 16 * 1024 * 1024,
        }
    }
}

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do", "else", "enum", "export", "extends", "false",
    "finally", "for", "function", "if", "import", "in", "instanceof", "let", "new", "null", "return", "static", "super", "switch", "this", "throw",
    "true", "try", "typeof", "var", "void", "while", "with", "yield", "await", "arguments", "eval", "vars",
    // reserved in strict mode only
    "implements", "interface", "package", "private", "protected", "public",
];

/// Variable names that can be bound as plain function parameters.
fn bindable_names(vars: &Vars) -> Vec<String> {
    let Ok(ident) = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$") else {
        return Vec::new();
    };
    vars.keys().filter(|k| ident.is_match(k) && !RESERVED.contains(&k.as_str())).cloned().collect()
}

/// Wrap a user body into a program whose completion value is the JSON text of
/// `{vars, result}`.
fn build_program(
    body: &str,
    vars: &Vars,
) -> Result<String> {
    let names = bindable_names(vars);
    let params = std::iter::once("vars".to_string()).chain(names.iter().cloned()).collect::<Vec<_>>().join(", ");
    let args =
        std::iter::once("vars".to_string()).chain(names.iter().map(|n| format!("vars[{}]", serde_json::to_string(n).unwrap_or_default()))).collect::<Vec<_>>().join(", ");
    let seed = serde_json::to_string(vars)?;

    Ok(format!(
        "\"use strict\";\nconst vars = {seed};\nconst __result = (function ({params}) {{\n{body}\n}})({args});\nJSON.stringify({{ vars: vars, result: __result === undefined ? null : __result }});"
    ))
}

fn run_blocking(
    body: &str,
    vars: Vars,
    limits: ScriptLimits,
) -> Result<Vars> {
    let program = build_program(body, &vars)?;

    let runtime = JsRuntime::new().map_err(|e| ChatflowError::Script(e.to_string()))?;
    runtime.set_memory_limit(limits.memory_limit);
    let deadline = Instant::now() + limits.timeout;
    runtime.set_interrupt_handler(Some(Box::new(move || Instant::now() > deadline)));
    let ctx = JsContext::full(&runtime).map_err(|e| ChatflowError::Script(e.to_string()))?;

    let output = ctx.with(|ctx| match ctx.eval::<String, _>(program) {
        Ok(json) => Ok(json),
        Err(rquickjs::Error::Exception) => {
            let caught = ctx.catch();
            let message = caught
                .as_exception()
                .and_then(|e| e.message())
                .or_else(|| caught.as_string().and_then(|s| s.to_string().ok()))
                .unwrap_or_else(|| "uncaught exception".to_string());
            Err(ChatflowError::Exception {
                ecode: "JS_EXEC_ERROR".to_string(),
                message,
            })
        }
        Err(e) => Err(ChatflowError::Script(e.to_string())),
    })?;

    let parsed: Value = serde_json::from_str(&output)?;
    Ok(diff(&vars, &parsed))
}

/// Keys the script changed on `vars`, overlaid with the fields of the object
/// it returned.
fn diff(
    before: &Vars,
    output: &Value,
) -> Vars {
    let mut delta = Vars::new();
    if let Some(after) = output.get("vars").and_then(Value::as_object) {
        for (k, v) in after {
            if before.get::<Value>(k).as_ref() != Some(v) {
                delta.insert(k.clone(), v.clone());
            }
        }
    }
    if let Some(result) = output.get("result").and_then(Value::as_object) {
        for (k, v) in result {
            delta.insert(k.clone(), v.clone());
        }
    }
    delta
}

/// Run a script body against a copy of the session variables.
///
/// The only binding is `vars` (plus each variable under its own name when it
/// is a valid identifier). Every failure, including the time and memory
/// budget, comes back as `Err` with a message fit for the chat.
pub async fn evaluate_script(
    body: &str,
    vars: Vars,
    limits: ScriptLimits,
) -> Result<Vars> {
    let body = body.to_string();
    tokio::task::spawn_blocking(move || run_blocking(&body, vars, limits))
        .await
        .map_err(|e| ChatflowError::Script(format!("script task failed: {}", e)))?
        .map_err(|e| match e {
            ChatflowError::Exception {
                message, ..
            } => ChatflowError::Script(message),
            e => e,
        })
}
