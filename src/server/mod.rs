//! Server request pipeline (§4.G) and lifecycle (§5:
//! `create -> bind -> serve_forever -> shutdown`).
//!
//! [`Server`] owns a shared [`crate::datastore::ServerContext`] and drives
//! whatever [`Acceptor`] it is handed, spawning one connection task per
//! accepted transport. Each connection task owns its own framer buffer
//! exclusively and runs every decoded frame through [`pipeline::handle_frame`].

mod config;
mod connection;
pub mod identification;
mod listener;
mod pipeline;

pub use config::{ResponseManipulator, ServerConfig};
pub use identification::ModbusDeviceIdentification;
pub use listener::{Acceptor, Server, SingleAcceptor, TcpAcceptor};
pub use pipeline::handle_frame;
