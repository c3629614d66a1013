//! Skiff core
//!
//! Primitives shared by every layer of the skiff actor runtime:
//!
//! - Actor handles and handle allocation
//! - Message envelopes and opaque payloads
//! - Method-call codecs and decoder registries
//! - Single-shot response promises
//! - Ambient trace-id propagation
//! - Per-actor metrics
//! - Time abstraction and telemetry bootstrap

pub mod codec;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod handle;
pub mod io;
pub mod metrics;
pub mod promise;
pub mod telemetry;
pub mod trace;

pub use codec::{CallCodec, DecoderRegistry, JsonCallCodec};
pub use envelope::{CallType, Envelope, Payload};
pub use error::{Error, Result};
pub use handle::{ActorHandle, HandleAllocator};
pub use io::{ManualClock, TimeProvider, WallClockTime};
pub use metrics::{ActorMetrics, MetricsRegistry, MetricsSnapshot};
pub use promise::{response_channel, ResponsePromise, ResponseReceiver};
pub use telemetry::{init_telemetry, TelemetryConfig};
