//! The client façade (§4.H): typed request builders over the transaction
//! manager, covering the full function-code matrix plus reconnect-on-loss
//! (§4.F "Reconnection").
//!
//! Datatype conversion helpers (logical u32/i32/u64/i64/f32/f64/string
//! values to/from a register sequence) live in [`crate::pdu::datatypes`]
//! since they operate on decoded [`crate::pdu::Response`] payloads rather
//! than on the connection itself.

mod client;
mod config;
mod validate;

pub use client::{Client, ConnectFn};
pub use config::{ClientConfig, FramerKind};
