//! Struct and implementation of the Contact entry in the Kademlia routing table
use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    time::Instant,
};

use serde::{Deserialize, Serialize};

use crate::common::Id;

#[derive(Clone, Serialize, Deserialize)]
/// Contact entry in Kademlia routing table.
///
/// Two contacts are equal iff their ids are equal; `ip` and `port` are
/// informational. Only `last_seen` ever changes after creation.
pub struct Contact {
    id: Id,
    ip: String,
    port: u16,
    #[serde(skip, default = "Instant::now")]
    last_seen: Instant,
}

impl Contact {
    /// Creates a new Contact from an id, ip and port.
    pub fn new(id: Id, ip: impl Into<String>, port: u16) -> Contact {
        Contact {
            id,
            ip: ip.into(),
            port,
            last_seen: Instant::now(),
        }
    }

    /// Create a contact with a random id, for testing purposes.
    pub fn random(bit_length: usize) -> Contact {
        Contact::new(Id::random(bit_length), "127.0.0.1", 0)
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` as used to reach this contact.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    // === Public Methods ===

    /// Record confirmed liveness.
    pub fn seen(&mut self) {
        self.last_seen = Instant::now();
    }

    #[cfg(test)]
    pub(crate) fn with_last_seen(mut self, last_seen: Instant) -> Self {
        self.last_seen = last_seen;
        self
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Contact {}

impl Hash for Contact {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl Debug for Contact {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contact")
            .field("id", &self.id)
            .field("address", &self.address())
            .field("last_seen", &self.last_seen)
            .finish()
    }
}
