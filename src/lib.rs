//! A Modbus application protocol stack: PDU codecs for the full
//! function-code matrix, byte-exact MBAP/RTU/ASCII/socket framing, a
//! transport-agnostic transaction manager, a pluggable-datastore server
//! pipeline, and a typed client façade over it all.
//!
//! The crate is organized the way the exchange itself flows, leaves
//! first: [`datastore`] holds the data a server answers from;
//! [`pdu`] turns wire bytes into typed requests/responses against it;
//! [`frame`] turns a byte stream into PDUs and back; [`transaction`]
//! correlates requests and replies over one connection; [`server`] and
//! [`client`] are the two ends that drive all of the above.
//!
//! Logging is via `tracing`, errors via [`error::Error`]; the crate never
//! installs a subscriber of its own — embed it in a binary that does.

pub mod client;
pub mod datastore;
pub mod error;
pub mod frame;
pub mod pdu;
pub mod server;
pub mod transaction;
pub mod transport;

pub use error::{Error, Result};
