//! Skiff runtime
//!
//! The actor host and mailbox engine, the actor system that owns the
//! actor table and routes messages, and the in-process transport.
//!
//! Within one actor, execution is single-threaded: the pump drives one
//! handler at a time in mailbox order. Across actors, pumps run in
//! parallel on the tokio scheduler.

pub mod actor;
pub mod config;
pub mod host;
pub mod mailbox;
pub mod system;
pub mod transport;

pub use actor::{Actor, ActorContext};
pub use config::{ActorSystemConfig, InProcessTransportConfig};
pub use host::StartupState;
pub use mailbox::{Delivery, MailboxReceiver, MailboxSender};
pub use system::{
    ActorInfo, ActorRef, ActorSystem, ActorSystemBuilder, CreateOptions, WeakActorSystem,
};
pub use transport::{CallReply, InProcessTransport, Transport};
