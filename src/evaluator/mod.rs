//! Condition operators and the script sandbox.

mod condition;
mod script;

pub use condition::{Condition, Operator, evaluate_condition, first_match};
pub use script::{ScriptLimits, evaluate_script};
