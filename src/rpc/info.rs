use serde::{Deserialize, Serialize};

use crate::{Id, Node};

/// Information and statistics about a node, as answered to the `info` RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    id: Id,
    ip: String,
    port: u16,
    bit_length: usize,
    k: usize,
    alpha: usize,
    contacts: usize,
    buckets: usize,
    version: String,
}

impl Info {
    /// This Node's [Id]
    pub fn id(&self) -> &Id {
        &self.id
    }
    /// Address this node advertises to its peers.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
    /// Width of the keyspace this node routes in.
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }
    /// Bucket capacity.
    pub fn k(&self) -> usize {
        self.k
    }
    /// Lookup concurrency.
    pub fn alpha(&self) -> usize {
        self.alpha
    }
    /// Number of contacts in the routing table.
    pub fn contacts(&self) -> usize {
        self.contacts
    }
    /// Number of buckets the routing table has split into.
    pub fn buckets(&self) -> usize {
        self.buckets
    }
    /// Crate version the node runs.
    pub fn version(&self) -> &str {
        &self.version
    }
}

impl From<&Node> for Info {
    fn from(node: &Node) -> Self {
        let config = node.config();
        let contact = node.contact();
        let (contacts, buckets) = node.with_routing_table(|table| (table.size(), table.bucket_count()));

        Self {
            id: *contact.id(),
            ip: contact.ip().to_string(),
            port: contact.port(),
            bit_length: config.bit_length,
            k: config.k,
            alpha: config.alpha,
            contacts,
            buckets,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
