//! Compiled, immutable flow graph.
//!
//! A published [`GraphModel`] is compiled once into a [`Flow`]: node data is
//! validated and turned into actions, case nodes are folded into direct edges
//! and anchors are indexed by name. Sessions only ever execute compiled flows,
//! and a compiled flow never changes after it is built.

use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
};

use petgraph::{
    Direction,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use crate::{
    ChatflowError, GraphModel, Result,
    flow::{
        edge::{Edge, SourceHandle},
        node::{Node, NodeId, NodeKind},
    },
};

/// Data keys a case node may carry its branch handle under, when the edge
/// leading into it has none.
const CASE_HANDLE_KEYS: [&str; 4] = ["handle", "caseId", "conditionId", "buttonId"];

pub struct Flow {
    id: String,
    version: u64,
    graph: DiGraph<Node, Edge>,
    index: HashMap<NodeId, NodeIndex>,
    anchors: HashMap<String, NodeId>,
    /// (source, handle) pairs that went through a case node without exactly
    /// one real target
    broken: HashSet<(NodeId, String)>,
    start: NodeId,
}

impl std::fmt::Debug for Flow {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Flow").field("id", &self.id).field("version", &self.version).field("nodes", &self.graph.node_count()).finish()
    }
}

#[allow(unused)]
impl Flow {
    /// Validate and compile a graph.
    pub fn compile(
        id: &str,
        version: u64,
        model: &GraphModel,
    ) -> Result<Self> {
        let mut graph: DiGraph<Node, Edge> = DiGraph::new();
        let mut index = HashMap::new();
        let mut anchors = HashMap::new();
        let mut cases: HashMap<NodeId, Option<String>> = HashMap::new();
        let mut start = None;
        let mut seen = HashSet::new();

        for node in model.nodes.iter() {
            if node.id.is_empty() {
                return Err(ChatflowError::Flow("node without id".to_string()));
            }
            if !seen.insert(node.id.clone()) {
                return Err(ChatflowError::Flow(format!("duplicated node id '{}'", node.id)));
            }
            let kind = NodeKind::from_str(&node.kind).map_err(|_| ChatflowError::Flow(format!("node '{}' has unknown type '{}'", node.id, node.kind)))?;

            match kind {
                NodeKind::Case => {
                    let handle = CASE_HANDLE_KEYS.iter().find_map(|k| node.data.get(*k).and_then(|v| v.as_str()).map(str::to_string));
                    cases.insert(node.id.clone(), handle);
                    continue;
                }
                NodeKind::Start => {
                    if start.is_some() {
                        return Err(ChatflowError::Flow("flow has more than one start node".to_string()));
                    }
                    start = Some(node.id.clone());
                }
                NodeKind::Anchor => {
                    let name = node.data.get("anchorName").and_then(|v| v.as_str()).unwrap_or_default().trim().to_string();
                    if !name.is_empty() && anchors.insert(name.clone(), node.id.clone()).is_some() {
                        return Err(ChatflowError::Flow(format!("duplicated anchor name '{}'", name)));
                    }
                }
                _ => {}
            }

            let compiled = Node::new(node.id.clone(), kind, node.data.clone()).map_err(|e| ChatflowError::Flow(e.to_string()))?;
            let idx = graph.add_node(compiled);
            index.insert(node.id.clone(), idx);
        }

        let start = start.ok_or(ChatflowError::Flow("flow has no start node".to_string()))?;

        for edge in model.edges.iter() {
            if !seen.contains(&edge.source) {
                return Err(ChatflowError::Flow(format!("edge '{}' leaves unknown node '{}'", edge.id, edge.source)));
            }
            if !seen.contains(&edge.target) {
                return Err(ChatflowError::Flow(format!("edge '{}' points to unknown node '{}'", edge.id, edge.target)));
            }
        }

        // real -> real edges, and real -> case edges folded through the case node
        let mut broken = HashSet::new();
        for edge in model.edges.iter() {
            let Some(source) = index.get(&edge.source) else {
                // edges leaving case nodes are consumed while folding
                continue;
            };
            let mut handle = SourceHandle::parse(edge.source_handle.as_deref());

            if let Some(case_handle) = cases.get(&edge.target) {
                if handle.is_default() {
                    if let Some(h) = case_handle {
                        handle = SourceHandle::parse(Some(h));
                    }
                }
                let targets: Vec<&str> = model.edges.iter().filter(|e| e.source == edge.target).map(|e| e.target.as_str()).collect();
                match targets.as_slice() {
                    [target] if index.contains_key(*target) => {
                        let target = index[*target];
                        graph.add_edge(
                            *source,
                            target,
                            Edge {
                                id: edge.id.clone(),
                                source: edge.source.clone(),
                                target: graph[target].id.clone(),
                                source_handle: handle,
                            },
                        );
                    }
                    _ => {
                        broken.insert((edge.source.clone(), handle.key().to_string()));
                    }
                }
                continue;
            }

            let target = index[&edge.target];
            graph.add_edge(
                *source,
                target,
                Edge {
                    id: edge.id.clone(),
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    source_handle: handle,
                },
            );
        }

        Ok(Self {
            id: id.to_string(),
            version,
            graph,
            index,
            anchors,
            broken,
            start,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn start_node(&self) -> &NodeId {
        &self.start
    }

    pub fn get_node(
        &self,
        id: &str,
    ) -> Option<&Node> {
        self.index.get(id).map(|idx| &self.graph[*idx])
    }

    /// Node id of the anchor named `name`.
    pub fn find_anchor(
        &self,
        name: &str,
    ) -> Option<&NodeId> {
        self.anchors.get(name.trim())
    }

    fn outgoing(
        &self,
        nid: &str,
    ) -> Vec<&Edge> {
        self.index.get(nid).map(|idx| self.graph.edges_directed(*idx, Direction::Outgoing).map(|e| e.weight()).collect()).unwrap_or_default()
    }

    pub fn has_route(
        &self,
        nid: &str,
        handle: &SourceHandle,
    ) -> bool {
        self.outgoing(nid).iter().any(|e| e.source_handle.key() == handle.key())
    }

    /// Target of the edge leaving `nid` through `handle`.
    ///
    /// `Ok(None)` when there is no such edge. Two edges on the same handle, or a
    /// case node without exactly one target, are integrity errors: the engine
    /// never picks one of several candidates.
    pub fn next(
        &self,
        nid: &str,
        handle: &SourceHandle,
    ) -> Result<Option<NodeId>> {
        if self.broken.contains(&(nid.to_string(), handle.key().to_string())) {
            return Err(ChatflowError::Graph(format!("branch '{}' of node '{}' does not lead to exactly one node", handle, nid)));
        }
        let targets: Vec<&Edge> = self.outgoing(nid).into_iter().filter(|e| e.source_handle.key() == handle.key()).collect();
        match targets.as_slice() {
            [] => Ok(None),
            [edge] => Ok(Some(edge.target.clone())),
            _ => Err(ChatflowError::Graph(format!("node '{}' has {} edges on handle '{}'", nid, targets.len(), handle))),
        }
    }

    /// Default edge, or the only outgoing edge whatever its handle.
    pub fn next_single(
        &self,
        nid: &str,
    ) -> Result<Option<NodeId>> {
        if let Some(target) = self.next(nid, &SourceHandle::default())? {
            return Ok(Some(target));
        }
        let edges = self.outgoing(nid);
        match edges.as_slice() {
            [] => Ok(None),
            [edge] => Ok(Some(edge.target.clone())),
            _ => Err(ChatflowError::Graph(format!("node '{}' has {} outgoing edges and none is the default", nid, edges.len()))),
        }
    }

    /// Output a human-readable representation of the flow graph
    pub fn schema(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("=== Flow {}@{} ===", self.id, self.version));
        lines.push(format!("Nodes: {}, Edges: {}", self.graph.node_count(), self.graph.edge_count()));
        lines.push(String::new());

        lines.push("--- Nodes ---".to_string());
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            lines.push(format!("[{}] {}", node.id, node.kind.as_ref()));
        }
        lines.push(String::new());

        lines.push("--- Graph Structure ---".to_string());
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let outgoing: Vec<String> = self
                .graph
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| format!("{}({})", self.graph[e.target()].id, e.weight().source_handle))
                .collect();

            if outgoing.is_empty() {
                lines.push(format!("{} -> (end)", node.id));
            } else {
                lines.push(format!("{} -> {}", node.id, outgoing.join(", ")));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::flow::edge::FixedHandle;

    fn graph(v: serde_json::Value) -> GraphModel {
        serde_json::from_value(v).unwrap()
    }

    fn branching() -> GraphModel {
        graph(json!({
            "nodes": [
                {"id": "s", "type": "start", "data": {}},
                {"id": "c", "type": "condition", "data": {"conditions": [
                    {"id": "gold", "variable": "plan", "operator": "==", "value": "gold"}
                ]}},
                {"id": "case-gold", "type": "case", "data": {}},
                {"id": "case-else", "type": "case", "data": {"handle": "else"}},
                {"id": "m1", "type": "message", "data": {"text": "vip"}},
                {"id": "m2", "type": "message", "data": {"text": "comum"}},
                {"id": "a", "type": "anchor", "data": {"anchorName": "topo"}}
            ],
            "edges": [
                {"id": "e1", "source": "s", "target": "c"},
                {"id": "e2", "source": "c", "target": "case-gold", "sourceHandle": "gold"},
                {"id": "e3", "source": "case-gold", "target": "m1"},
                {"id": "e4", "source": "c", "target": "case-else"},
                {"id": "e5", "source": "case-else", "target": "m2"}
            ]
        }))
    }

    #[test]
    fn test_compile_folds_case_nodes() {
        let flow = Flow::compile("f", 1, &branching()).unwrap();
        assert_eq!(flow.start_node(), "s");
        assert!(flow.get_node("case-gold").is_none());
        assert_eq!(flow.next("s", &SourceHandle::default()).unwrap(), Some("c".to_string()));
        assert_eq!(flow.next("c", &SourceHandle::Branch("gold".to_string())).unwrap(), Some("m1".to_string()));
        assert_eq!(flow.next("c", &SourceHandle::Fixed(FixedHandle::Else)).unwrap(), Some("m2".to_string()));
        assert_eq!(flow.next("m1", &SourceHandle::default()).unwrap(), None);
        assert_eq!(flow.find_anchor("topo"), Some(&"a".to_string()));
        assert!(flow.schema().contains("c -> "));
    }

    #[test]
    fn test_duplicate_handle_fails_closed() {
        let mut model = branching();
        model.edges.push(crate::EdgeModel {
            id: "dup".to_string(),
            source: "s".to_string(),
            target: "m2".to_string(),
            source_handle: None,
        });
        let flow = Flow::compile("f", 1, &model).unwrap();
        assert!(matches!(flow.next("s", &SourceHandle::default()), Err(ChatflowError::Graph(_))));
    }

    #[test]
    fn test_case_node_without_single_target_is_broken() {
        let mut model = branching();
        model.edges.retain(|e| e.id != "e3");
        let flow = Flow::compile("f", 1, &model).unwrap();
        assert!(matches!(flow.next("c", &SourceHandle::Branch("gold".to_string())), Err(ChatflowError::Graph(_))));
    }

    #[test]
    fn test_branch_ids_spelling_fixed_names_route() {
        let model = graph(json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "c", "type": "condition", "data": {"hasElse": false, "conditions": [
                    {"id": "success", "variable": "ok", "operator": "==", "value": "1"}
                ]}},
                {"id": "m", "type": "message", "data": {"text": "ok"}}
            ],
            "edges": [
                {"id": "e1", "source": "s", "target": "c"},
                {"id": "e2", "source": "c", "target": "m", "sourceHandle": "success"}
            ]
        }));
        let flow = Flow::compile("f", 1, &model).unwrap();
        let rule = SourceHandle::Branch("success".to_string());
        assert!(flow.has_route("c", &rule));
        assert_eq!(flow.next("c", &rule).unwrap(), Some("m".to_string()));
    }

    #[test]
    fn test_next_single_uses_sole_edge() {
        let model = graph(json!({
            "nodes": [
                {"id": "s", "type": "start"},
                {"id": "t", "type": "template", "data": {"text": "?", "buttons": [{"id": "b1", "label": "Sim"}]}},
                {"id": "m", "type": "message", "data": {"text": "ok"}}
            ],
            "edges": [
                {"id": "e1", "source": "s", "target": "t"},
                {"id": "e2", "source": "t", "target": "m", "sourceHandle": "b-old"}
            ]
        }));
        let flow = Flow::compile("f", 1, &model).unwrap();
        assert_eq!(flow.next_single("t").unwrap(), Some("m".to_string()));
        assert_eq!(flow.next_single("m").unwrap(), None);
    }

    #[test]
    fn test_compile_rejects_invalid_graphs() {
        let no_start = graph(json!({"nodes": [{"id": "m", "type": "message", "data": {"text": "x"}}], "edges": []}));
        assert!(Flow::compile("f", 1, &no_start).is_err());

        let two_starts = graph(json!({"nodes": [{"id": "a", "type": "start"}, {"id": "b", "type": "start"}], "edges": []}));
        assert!(Flow::compile("f", 1, &two_starts).is_err());

        let unknown = graph(json!({"nodes": [{"id": "s", "type": "start"}, {"id": "x", "type": "subflow"}], "edges": []}));
        assert!(Flow::compile("f", 1, &unknown).is_err());

        let dangling = graph(json!({"nodes": [{"id": "s", "type": "start"}], "edges": [{"id": "e", "source": "s", "target": "ghost"}]}));
        assert!(Flow::compile("f", 1, &dangling).is_err());

        let dup_ids = graph(json!({"nodes": [{"id": "s", "type": "start"}, {"id": "s", "type": "message", "data": {"text": "x"}}], "edges": []}));
        assert!(Flow::compile("f", 1, &dup_ids).is_err());

        let dup_anchor = graph(json!({"nodes": [
            {"id": "s", "type": "start"},
            {"id": "a1", "type": "anchor", "data": {"anchorName": "x"}},
            {"id": "a2", "type": "anchor", "data": {"anchorName": "x"}}
        ], "edges": []}));
        assert!(Flow::compile("f", 1, &dup_anchor).is_err());

        let bad_data = graph(json!({"nodes": [{"id": "s", "type": "start"}, {"id": "m", "type": "message", "data": {"text": 5}}], "edges": []}));
        assert!(Flow::compile("f", 1, &bad_data).is_err());
    }
}
