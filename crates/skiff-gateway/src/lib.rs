//! Skiff gateway
//!
//! Bridges external TCP and WebSocket clients into the actor mesh: each
//! accepted client is wrapped in a session actor whose behavior is
//! delegated to an application-supplied router.

pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;
pub mod router;
pub mod session;

pub use config::GatewayConfig;
pub use connection::{ClientConnection, CloseReason, TransportProtocol};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayAddrs, SessionInfo};
pub use router::{RouterFactory, SessionContext, SessionMetadata, SessionRouter};
pub use session::{
    CloseCommand, SessionActor, SESSION_CLIENT_CLOSED_TAG, SESSION_CLOSE_TAG, SESSION_IDLE_TAG,
    SESSION_INBOUND_TAG, SESSION_OUTBOUND_TAG,
};
