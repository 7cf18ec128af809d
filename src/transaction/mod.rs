//! Transaction manager (§4.F): the transport-agnostic half of the client
//! that correlates outbound requests with inbound replies, enforces the
//! per-transport concurrency contract, and drives timeouts, retries, and
//! broadcast.
//!
//! A [`TransactionManager`] owns exactly one transport connection for its
//! lifetime — it has no reconnect logic of its own (per the redesign
//! notes' "owning tree" guidance, that belongs one layer up, in
//! [`crate::client`], which recreates a manager after a transport loss).
//! When its transport dies, every pending and queued request fails with
//! [`crate::error::Error::Connection`] and the manager's task ends.

mod manager;
mod state;
mod types;

pub use manager::TransactionManager;
pub use state::TransactionState;
pub use types::{Concurrency, InboundReply, ManagerConfig, OutboundRequest};
