//! Skiff registry
//!
//! The cluster registry contract: names and handles resolve to
//! `(node, handle)` locations, and named services are unique across the
//! cluster at any instant.
//!
//! Two implementations ship here:
//! - [`StaticRegistry`]: topology fixed at construction, for pre-agreed
//!   deployments and tests.
//! - [`DynamicRegistry`]: a TTL'd KV store plus pub/sub invalidation, for
//!   clusters whose membership changes at runtime.

pub mod dynamic;
pub mod error;
pub mod kv;
pub mod node;
pub mod registry;
pub mod static_registry;

pub use dynamic::{DynamicRegistry, DynamicRegistryConfig};
pub use error::{RegistryError, RegistryResult};
pub use kv::{open_backend, KvStore, KvSubscription, MemoryKv};
pub use node::{NodeDescriptor, NodeId};
pub use registry::{ActorLocation, ClusterRegistry};
pub use static_registry::StaticRegistry;
