#![doc = include_str!("../README.md")]

// Public modules
mod common;
mod config;
mod error;
mod node;
pub mod rpc;
pub mod server;

pub use crate::common::{
    messages, select_closest, shared_prefix_bit_length, sort_by_distance, xor_distance, Contact, Id,
    Insertion, KBucket, RoutingTable, ID_SIZE, MAX_BIT_LENGTH,
};
pub use bytes::Bytes;
pub use config::Config;
pub use error::Error;
pub use node::Node;
pub use rpc::{HttpAdapter, Info, MemoryNetwork, NetworkAdapter, StoreOutcome, Testnet};

/// Alias Result to be the crate Result.
pub type Result<T, E = Error> = core::result::Result<T, E>;
