//! Per-group voice connections.
//!
//! [`ConnectionTable`] holds one guarded slot per group; its async mutex is
//! the group's exclusion domain for connect, wiring and teardown.
//! [`ConnectionManager`] opens sessions, waits for them to become ready,
//! watches for disconnects and releases every per-group structure when a
//! session is lost.

mod manager;
mod table;
mod types;

pub use manager::{ConnectionManager, ManagerParts};
pub use table::ConnectionTable;
pub use types::{ConnectionState, ConnectionStatus, GroupSlot, ReconnectSummary};
