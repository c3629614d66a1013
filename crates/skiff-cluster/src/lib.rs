//! Skiff cluster transport
//!
//! Length-framed, heartbeated TCP links between homogeneous cluster
//! nodes: the frame format, the binary envelope codec, remote-call
//! faults, and the transport with its pending-call correlation table.

pub mod codec;
pub mod config;
pub mod error;
pub mod fault;
pub mod frame;
pub mod transport;

pub use config::ClusterTransportConfig;
pub use error::{ClusterError, ClusterResult};
pub use fault::{RemoteCallFault, REMOTE_FAULT_TYPE_TAG};
pub use frame::FrameType;
pub use transport::ClusterTransport;
