use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    ChatflowError, FlowDefinition, GraphModel, Result,
    common::MemCache,
    flow::Flow,
    store::{Store, data::FlowVersion},
    utils,
};

const CACHE_CAPACITY: usize = 256;

/// Drafts, publishing and compiled published graphs.
///
/// Published versions are immutable, so a compiled graph is cached once per
/// `flow_id@version` and shared by every session running on it.
pub struct FlowRegistry {
    store: Arc<Store>,
    cache: MemCache<String, Arc<Flow>>,
}

impl FlowRegistry {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            cache: MemCache::new(CACHE_CAPACITY),
        }
    }

    pub fn create_flow(
        &self,
        name: &str,
        now: i64,
    ) -> Result<FlowDefinition> {
        let def = FlowDefinition {
            id: utils::longid(),
            name: name.to_string(),
            draft: GraphModel::with_start(),
            published: None,
            version: 0,
            create_time: now,
            update_time: now,
        };
        self.store.save_flow(&def)?;
        info!(flow = %def.id, "flow created");
        Ok(def)
    }

    pub fn get(
        &self,
        flow_id: &str,
    ) -> Result<FlowDefinition> {
        self.store.load_flow(flow_id)
    }

    /// Replace the draft. The single start node must stay where it was.
    pub fn save_draft(
        &self,
        flow_id: &str,
        draft: GraphModel,
        now: i64,
    ) -> Result<FlowDefinition> {
        let mut def = self.store.load_flow(flow_id)?;
        if draft.start_count() != 1 {
            return Err(ChatflowError::Flow("a draft must have exactly one start node".to_string()));
        }
        let start_id = |g: &GraphModel| g.nodes.iter().find(|n| n.kind == "start").map(|n| n.id.clone());
        if def.draft.start_count() == 1 && start_id(&def.draft) != start_id(&draft) {
            return Err(ChatflowError::Flow("the start node cannot be replaced".to_string()));
        }

        def.draft = draft;
        def.update_time = now;
        self.store.save_flow(&def)?;
        debug!(flow = %flow_id, "draft saved");
        Ok(def)
    }

    /// Compile the draft and make it the live graph under the next version.
    ///
    /// Nothing is written when the draft does not compile, so sessions keep
    /// running on the previous version.
    pub fn publish(
        &self,
        flow_id: &str,
        now: i64,
    ) -> Result<FlowDefinition> {
        let mut def = self.store.load_flow(flow_id)?;
        let version = def.version + 1;
        let compiled = Arc::new(Flow::compile(flow_id, version, &def.draft)?);

        self.store.save_version(flow_id, version, &def.draft, now)?;
        def.published = Some(def.draft.clone());
        def.version = version;
        def.update_time = now;
        self.store.save_flow(&def)?;

        self.cache.set(FlowVersion::key(flow_id, version), compiled);
        info!(flow = %flow_id, version, "flow published");
        Ok(def)
    }

    /// Compiled graph of the current published version.
    pub fn published(
        &self,
        flow_id: &str,
    ) -> Result<Arc<Flow>> {
        let def = self.store.load_flow(flow_id)?;
        if def.version == 0 {
            return Err(ChatflowError::Flow(format!("flow '{}' is not published", flow_id)));
        }
        self.version(flow_id, def.version)
    }

    /// Compiled graph of a given published version.
    pub fn version(
        &self,
        flow_id: &str,
        version: u64,
    ) -> Result<Arc<Flow>> {
        let key = FlowVersion::key(flow_id, version);
        if let Some(flow) = self.cache.get(&key) {
            return Ok(flow);
        }
        let graph = self.store.load_version(flow_id, version)?;
        let flow = Arc::new(Flow::compile(flow_id, version, &graph)?);
        self.cache.set(key, flow.clone());
        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::FlowRegistry;
    use crate::{
        GraphModel,
        store::{DbStore, MemStore, Store},
    };

    fn registry() -> FlowRegistry {
        let store = Store::new();
        MemStore::new().init(&store).unwrap();
        FlowRegistry::new(Arc::new(store))
    }

    fn graph(text: &str) -> GraphModel {
        serde_json::from_value(json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "m", "type": "message", "data": {"text": text}}
            ],
            "edges": [{"id": "e", "source": "start", "target": "m"}]
        }))
        .unwrap()
    }

    #[test]
    fn test_publish_bumps_version() {
        let registry = registry();
        let def = registry.create_flow("suporte", 1).unwrap();
        assert_eq!(def.draft.start_count(), 1);
        assert!(registry.published(&def.id).is_err());

        registry.save_draft(&def.id, graph("v1"), 2).unwrap();
        let def = registry.publish(&def.id, 3).unwrap();
        assert_eq!(def.version, 1);

        registry.save_draft(&def.id, graph("v2"), 4).unwrap();
        assert_eq!(registry.published(&def.id).unwrap().version(), 1);

        registry.publish(&def.id, 5).unwrap();
        assert_eq!(registry.published(&def.id).unwrap().version(), 2);
        assert_eq!(registry.version(&def.id, 1).unwrap().get_node("m").unwrap().data, json!({"text": "v1"}));
    }

    #[test]
    fn test_invalid_draft_does_not_publish() {
        let registry = registry();
        let def = registry.create_flow("suporte", 1).unwrap();
        registry.save_draft(&def.id, graph("ok"), 2).unwrap();
        registry.publish(&def.id, 3).unwrap();

        let mut broken = graph("x");
        broken.edges.push(crate::EdgeModel {
            id: "dangling".to_string(),
            source: "m".to_string(),
            target: "ghost".to_string(),
            source_handle: None,
        });
        registry.save_draft(&def.id, broken, 4).unwrap();
        assert!(registry.publish(&def.id, 5).is_err());
        assert_eq!(registry.get(&def.id).unwrap().version, 1);
    }

    #[test]
    fn test_draft_rules() {
        let registry = registry();
        let def = registry.create_flow("suporte", 1).unwrap();

        let no_start = GraphModel::default();
        assert!(registry.save_draft(&def.id, no_start, 2).is_err());

        let mut moved = graph("x");
        moved.nodes[0].id = "other".to_string();
        moved.edges[0].source = "other".to_string();
        assert!(registry.save_draft(&def.id, moved, 2).is_err());

        assert!(registry.save_draft("missing", graph("x"), 2).is_err());
    }
}
