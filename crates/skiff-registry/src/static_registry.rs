//! Config-driven registry for fixed-topology clusters.

use crate::error::{RegistryError, RegistryResult};
use crate::node::{NodeDescriptor, NodeId};
use crate::registry::{ActorLocation, ClusterRegistry};
use async_trait::async_trait;
use skiff_core::handle::ActorHandle;
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry whose nodes and service placements are given at construction.
///
/// Node descriptors are immutable. Registration is local bookkeeping only:
/// it fails when the requested name is pre-declared for a different
/// location, and otherwise records the name so local lookups resolve it.
pub struct StaticRegistry {
    local_node_id: NodeId,
    nodes: HashMap<NodeId, NodeDescriptor>,
    services: HashMap<String, ActorLocation>,
    handles: HashMap<ActorHandle, NodeId>,
    local_registrations: RwLock<HashMap<String, ActorHandle>>,
}

impl StaticRegistry {
    /// Build a registry from the cluster layout.
    pub fn new(
        local_node_id: NodeId,
        nodes: Vec<NodeDescriptor>,
        services: HashMap<String, ActorLocation>,
    ) -> Self {
        let handles = services
            .values()
            .map(|location| (location.handle, location.node_id.clone()))
            .collect();
        Self {
            local_node_id,
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            services,
            handles,
            local_registrations: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ClusterRegistry for StaticRegistry {
    fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    async fn try_resolve_by_name(&self, name: &str) -> RegistryResult<Option<ActorLocation>> {
        if let Some(location) = self.services.get(name) {
            return Ok(Some(location.clone()));
        }
        let registrations = self
            .local_registrations
            .read()
            .expect("registrations lock poisoned");
        Ok(registrations
            .get(name)
            .map(|handle| ActorLocation::new(self.local_node_id.clone(), *handle)))
    }

    async fn try_resolve_by_handle(
        &self,
        handle: ActorHandle,
    ) -> RegistryResult<Option<ActorLocation>> {
        if let Some(node_id) = self.handles.get(&handle) {
            return Ok(Some(ActorLocation::new(node_id.clone(), handle)));
        }
        let registrations = self
            .local_registrations
            .read()
            .expect("registrations lock poisoned");
        Ok(registrations
            .values()
            .any(|h| *h == handle)
            .then(|| ActorLocation::new(self.local_node_id.clone(), handle)))
    }

    async fn try_get_node(&self, node_id: &NodeId) -> RegistryResult<Option<NodeDescriptor>> {
        Ok(self.nodes.get(node_id).cloned())
    }

    async fn register_local_actor(&self, name: &str, handle: ActorHandle) -> RegistryResult<()> {
        if let Some(declared) = self.services.get(name) {
            if declared.node_id != self.local_node_id {
                return Err(RegistryError::NameAlreadyClaimed {
                    name: name.to_string(),
                    owner_node: declared.node_id.to_string(),
                });
            }
            if declared.handle != handle {
                return Err(RegistryError::NameMismatch {
                    name: name.to_string(),
                });
            }
        }

        self.local_registrations
            .write()
            .expect("registrations lock poisoned")
            .insert(name.to_string(), handle);
        Ok(())
    }

    async fn unregister_local_actor(&self, name: &str, _handle: ActorHandle) -> RegistryResult<()> {
        self.local_registrations
            .write()
            .expect("registrations lock poisoned")
            .remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(n: u16) -> NodeDescriptor {
        NodeDescriptor::new(
            NodeId::new(format!("node-{n}")).unwrap(),
            format!("127.0.0.1:{}", 9000 + n).parse().unwrap(),
        )
    }

    fn registry() -> StaticRegistry {
        let mut services = HashMap::new();
        services.insert(
            "echo".to_string(),
            ActorLocation::new(NodeId::new("node-2").unwrap(), ActorHandle::from_raw(1001)),
        );
        StaticRegistry::new(
            NodeId::new("node-1").unwrap(),
            vec![node(1), node(2)],
            services,
        )
    }

    #[tokio::test]
    async fn test_declared_service_resolves() {
        let registry = registry();
        let location = registry.try_resolve_by_name("echo").await.unwrap().unwrap();
        assert_eq!(location.node_id.as_str(), "node-2");
        assert_eq!(location.handle.raw(), 1001);
    }

    #[tokio::test]
    async fn test_handle_routes_to_declaring_node() {
        let registry = registry();
        let location = registry
            .try_resolve_by_handle(ActorHandle::from_raw(1001))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(location.node_id.as_str(), "node-2");
    }

    #[tokio::test]
    async fn test_register_conflicts_with_declaration() {
        let registry = registry();
        let result = registry
            .register_local_actor("echo", ActorHandle::from_raw(5))
            .await;
        assert!(matches!(
            result,
            Err(RegistryError::NameAlreadyClaimed { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_unregister_round_trip() {
        let registry = registry();
        let handle = ActorHandle::from_raw(42);

        registry.register_local_actor("lobby", handle).await.unwrap();
        let location = registry
            .try_resolve_by_name("lobby")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(location.node_id.as_str(), "node-1");
        assert_eq!(location.handle, handle);

        registry
            .unregister_local_actor("lobby", handle)
            .await
            .unwrap();
        assert!(registry.try_resolve_by_name("lobby").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_node_lookup() {
        let registry = registry();
        let missing = NodeId::new("node-9").unwrap();
        assert!(registry.try_get_node(&missing).await.unwrap().is_none());
    }
}
