//! Edge handles.
//!
//! Every outgoing edge leaves its node through a handle. Plain sequential links
//! use the default handle, branching nodes use fixed names or the id of the
//! rule/button the branch belongs to.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::flow::node::NodeId;

/// Unique identifier for an edge within a flow.
pub type EdgeId = String;

/// Fixed source handle names.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::AsRefStr, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FixedHandle {
    /// Sequential flow.
    #[default]
    Default,
    /// Condition without a matching rule.
    Else,
    /// 2xx response of an http request.
    Success,
    /// Timeout, network failure or non-2xx response.
    Error,
    /// Schedule window is open.
    Inside,
    /// Schedule window is closed.
    Outside,
}

/// Handle an edge originates from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum SourceHandle {
    Fixed(FixedHandle),
    /// Condition rule id or template button id.
    Branch(String),
}

impl Default for SourceHandle {
    fn default() -> Self {
        SourceHandle::Fixed(FixedHandle::default())
    }
}

impl SourceHandle {
    /// Parse the raw `sourceHandle` of an authored edge. Missing, empty and
    /// `source` mean the default handle.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return SourceHandle::default();
        };
        if raw == "source" {
            return SourceHandle::default();
        }
        match raw.parse::<FixedHandle>() {
            Ok(fixed) => SourceHandle::Fixed(fixed),
            Err(_) => SourceHandle::Branch(raw.to_string()),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, SourceHandle::Fixed(FixedHandle::Default))
    }

    /// Name the handle is routed by. A rule or button whose id spells a fixed
    /// name (`success`, `else`, ...) still meets its own edge.
    pub fn key(&self) -> &str {
        match self {
            SourceHandle::Fixed(h) => h.as_ref(),
            SourceHandle::Branch(id) => id,
        }
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            SourceHandle::Fixed(h) => write!(f, "{}", h.as_ref()),
            SourceHandle::Branch(id) => write!(f, "{}", id),
        }
    }
}

/// Runtime edge, after case nodes have been folded away.
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: SourceHandle,
}

#[cfg(test)]
mod tests {
    use super::{FixedHandle, SourceHandle};

    #[test]
    fn test_parse_handles() {
        assert_eq!(SourceHandle::parse(None), SourceHandle::Fixed(FixedHandle::Default));
        assert_eq!(SourceHandle::parse(Some("")), SourceHandle::Fixed(FixedHandle::Default));
        assert_eq!(SourceHandle::parse(Some("source")), SourceHandle::Fixed(FixedHandle::Default));
        assert_eq!(SourceHandle::parse(Some("default")), SourceHandle::Fixed(FixedHandle::Default));
        assert_eq!(SourceHandle::parse(Some("else")), SourceHandle::Fixed(FixedHandle::Else));
        assert_eq!(SourceHandle::parse(Some("error")), SourceHandle::Fixed(FixedHandle::Error));
        assert_eq!(SourceHandle::parse(Some("outside")), SourceHandle::Fixed(FixedHandle::Outside));
        assert_eq!(SourceHandle::parse(Some("btn-1")), SourceHandle::Branch("btn-1".to_string()));
        assert_eq!(SourceHandle::parse(Some("btn-1")).to_string(), "btn-1");
        assert_eq!(SourceHandle::parse(Some("success")).to_string(), "success");
    }

    #[test]
    fn test_branch_spelling_a_fixed_name_shares_its_key() {
        assert_eq!(SourceHandle::Branch("success".to_string()).key(), SourceHandle::parse(Some("success")).key());
        assert_eq!(SourceHandle::Branch("default".to_string()).key(), SourceHandle::default().key());
        assert_ne!(SourceHandle::Branch("b1".to_string()).key(), SourceHandle::parse(Some("else")).key());
    }
}
