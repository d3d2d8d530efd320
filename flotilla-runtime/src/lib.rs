//! # Flotilla Runtime
//! The small set of runtime primitives flotilla services are built on.
//!
//! - [Sharded] runs one instance of a service per shard, each owned by its own
//!   actor task, and lets callers invoke closures on a single shard or fan out to
//!   every shard.
//! - [Gate] admits operations until it is closed and then waits for every admitted
//!   operation to complete, which is how background loops are shut down cleanly.
//! - [AbortSource] is a shared, clonable abort signal with an abortable sleep.

mod abort;
mod gate;
mod sharded;

pub use abort::{AbortSource, SleepAborted};
pub use gate::{Gate, GateClosed, GateGuard};
pub use sharded::{ShardError, ShardId, Sharded};
