//! Avatara Sync - Best-effort state replication without a central authority
//!
//! Every local intent is published on the in-process event bus and, for
//! each remote participant currently in the room, invoked as a named RPC
//! with a JSON payload. Inbound RPCs resolve the caller's local
//! representation (remote avatar, placement handler, history) and return an
//! advisory `"ok"` / `"error"` status. Nothing is retried.
//!
//! The room transport and the 3D scene are external collaborators, reached
//! through the `Room` and `Scene` traits.

pub mod bus;
pub mod catalog;
pub mod highlight;
pub mod locked;
pub mod placement;
pub mod room;
pub mod router;
pub mod rpc;
pub mod scene;
pub mod state;
pub mod studio;

pub use bus::*;
pub use catalog::*;
pub use highlight::*;
pub use locked::*;
pub use placement::*;
pub use room::*;
pub use router::*;
pub use rpc::*;
pub use scene::*;
pub use state::*;
pub use studio::*;
