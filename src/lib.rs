//! # Flotilla
//! Cluster membership for sharded nodes whose configuration lives in a
//! replicated consensus group.
//!
//! This is a convenience package which includes all of the sub-projects within
//! Flotilla:
//!
//! ### Features
//! - `flotilla_futures` - Sequential and parallel async transforms over collections.
//! - `flotilla_runtime` - Sharded service actors, lifecycle gates and abort sources.
//! - `flotilla_members` - The membership manager: seed server joins, members tables and connections.

#[cfg(feature = "flotilla-futures")]
pub use flotilla_futures as futures;
#[cfg(feature = "flotilla-members")]
pub use flotilla_members as members;
#[cfg(feature = "flotilla-runtime")]
pub use flotilla_runtime as runtime;
