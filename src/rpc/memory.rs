//! In-process [NetworkAdapter] for tests and simulations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use super::NetworkAdapter;
use crate::common::{Contact, Id, RequestSpecific, ResponseSpecific};
use crate::node::WeakNode;
use crate::{Config, Error, Node, Result};

#[derive(Debug, Clone)]
struct MemoryPeer {
    node: WeakNode,
    reachable: bool,
}

/// Delivers requests by calling [Node::handle_request] on the registered
/// recipient directly.
///
/// Peers are held weakly, so a dropped [Node] becomes unreachable on its own.
/// Cloning shares the same set of peers.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    peers: Arc<RwLock<HashMap<Id, MemoryPeer>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `node` reachable under its id.
    pub fn register(&self, node: &Node) {
        let peer = MemoryPeer {
            node: node.downgrade(),
            reachable: true,
        };

        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node.id(), peer);
    }

    pub fn remove(&self, id: &Id) -> bool {
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    /// Simulate a node going offline, or coming back.
    pub fn set_reachable(&self, id: &Id, reachable: bool) -> bool {
        match self
            .peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(id)
        {
            Some(peer) => {
                peer.reachable = reachable;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NetworkAdapter for MemoryNetwork {
    fn request(&self, recipient: &Contact, request: RequestSpecific) -> Result<ResponseSpecific> {
        // Never hold the peers lock while the recipient handles the request,
        // it may well send requests of its own.
        let peer = self
            .peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(recipient.id())
            .cloned();

        let node = match peer {
            Some(MemoryPeer { node, reachable: true }) => node.upgrade(),
            _ => None,
        };

        match node {
            Some(node) => Ok(node.handle_request(request)),
            None => {
                trace!(to = ?recipient.id(), "Unreachable peer");
                Err(Error::Unreachable(recipient.address()))
            }
        }
    }
}

/// Create a testnet of Dht nodes sharing one [MemoryNetwork].
#[derive(Debug)]
pub struct Testnet {
    pub network: Arc<MemoryNetwork>,
    pub nodes: Vec<Node>,
}

impl Testnet {
    /// Create `count` nodes with distinct random ids, each bootstrapped from
    /// the first one.
    pub fn new(count: usize, config: Config) -> Result<Testnet> {
        config.validate()?;

        if config.bit_length < usize::BITS as usize && count > 1 << config.bit_length {
            return Err(Error::InvalidConfig(format!(
                "a {} bit keyspace can not hold {count} nodes",
                config.bit_length
            )));
        }

        let network = Arc::new(MemoryNetwork::new());
        let mut ids = HashSet::with_capacity(count);
        let mut nodes: Vec<Node> = Vec::with_capacity(count);

        for i in 0..count {
            let mut id = config.random_id();
            while !ids.insert(id) {
                id = config.random_id();
            }

            let port = 6881u16.wrapping_add(i as u16);
            let contact = Contact::new(id, "127.0.0.1", port);
            let node = Node::new(config.clone(), contact, network.clone())?;

            network.register(&node);

            if let Some(seed) = nodes.first() {
                node.bootstrap(&seed.contact());
            }

            nodes.push(node);
        }

        Ok(Self { network, nodes })
    }
}
