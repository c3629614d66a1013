//! The cluster registry contract.

use crate::error::RegistryResult;
use crate::node::{NodeDescriptor, NodeId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skiff_core::handle::ActorHandle;

/// Where a cluster-addressable actor lives: a node plus the handle on
/// that node.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActorLocation {
    pub node_id: NodeId,
    pub handle: ActorHandle,
}

impl ActorLocation {
    /// Create a location.
    pub fn new(node_id: NodeId, handle: ActorHandle) -> Self {
        Self { node_id, handle }
    }
}

/// Resolves names and handles to locations and coordinates cross-node
/// name uniqueness.
///
/// # Guarantees
/// - A name resolves to exactly one location at any instant.
/// - `register_local_actor` fails while another live node owns the name.
/// - After `unregister_local_actor`, other nodes stop resolving the name
///   within the implementation's documented staleness window.
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// Identifier of this process in the cluster.
    fn local_node_id(&self) -> &NodeId;

    /// Global name lookup.
    async fn try_resolve_by_name(&self, name: &str) -> RegistryResult<Option<ActorLocation>>;

    /// Global handle lookup.
    async fn try_resolve_by_handle(
        &self,
        handle: ActorHandle,
    ) -> RegistryResult<Option<ActorLocation>>;

    /// Endpoint lookup for a node.
    async fn try_get_node(&self, node_id: &NodeId) -> RegistryResult<Option<NodeDescriptor>>;

    /// Publish that `(name, handle)` lives on this node.
    async fn register_local_actor(&self, name: &str, handle: ActorHandle) -> RegistryResult<()>;

    /// Remove a local registration.
    async fn unregister_local_actor(&self, name: &str, handle: ActorHandle) -> RegistryResult<()>;

    /// Release registry resources and withdraw this node's entries. The
    /// owning side of the registry's lifetime calls this.
    async fn shutdown(&self) -> RegistryResult<()> {
        Ok(())
    }
}
