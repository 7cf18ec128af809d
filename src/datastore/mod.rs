//! The pluggable datastore: sequential/sparse blocks, per-device contexts,
//! and the server-wide context that routes by device id.

pub mod block;
mod device;
mod file_records;
mod server_context;

pub use block::{Block, BlockResult, SequentialBlock, SparseBlock, SparseInit, SparseMutability};
pub use device::DeviceContext;
pub use file_records::FileRecordStore;
pub use server_context::ServerContext;
