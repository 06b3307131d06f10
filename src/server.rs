//! Answering inbound RPCs.

use std::num::NonZeroUsize;

use bytes::Bytes;
use lru::LruCache;
use tracing::debug;

use crate::common::{
    Contact, ErrorSpecific, FindNodeRequestArguments, FindNodeResponseArguments,
    FindValueRequestArguments, FindValueResponseArguments, Id, RequestTypeSpecific,
    ResponseSpecific, RoutingTable, StoreRequestArguments,
};
use crate::Config;

/// Dht server that can handle incoming rpc requests
pub trait Server: std::fmt::Debug + Send {
    /// Handle incoming requests.
    ///
    /// `from` is the requesting contact, already added to or refreshed in
    /// `routing_table`, or `None` for requests that carry no sender.
    ///
    /// Runs while the node holds its server lock, so it needs to be fast and
    /// must not send requests of its own.
    fn handle_request(
        &mut self,
        routing_table: &RoutingTable,
        from: Option<&Contact>,
        request: &RequestTypeSpecific,
    ) -> ResponseSpecific;
}

#[derive(Debug)]
/// Default implementation of [Server] trait.
///
/// Keeps up to [Config::max_values] values, evicting the least recently
/// used, and answers lookups from the routing table.
pub struct DefaultServer {
    /// Values store
    pub values: LruCache<Id, Bytes>,
    bit_length: usize,
    k: usize,
}

impl Default for DefaultServer {
    fn default() -> Self {
        DefaultServer::new(&Config::default())
    }
}

impl DefaultServer {
    pub fn new(config: &Config) -> Self {
        Self {
            values: LruCache::new(NonZeroUsize::new(config.max_values).unwrap_or(NonZeroUsize::MIN)),
            bit_length: config.bit_length,
            k: config.k,
        }
    }

    /// Closest contacts to `target`, leaving out the requester itself.
    fn closest(&self, routing_table: &RoutingTable, from: Option<&Contact>, target: &Id) -> Vec<Contact> {
        let mut contacts = routing_table.find_closest_contacts(target, self.k + 1);

        if let Some(from) = from {
            contacts.retain(|contact| contact != from);
        }
        contacts.truncate(self.k);

        contacts
    }
}

impl Server for DefaultServer {
    fn handle_request(
        &mut self,
        routing_table: &RoutingTable,
        from: Option<&Contact>,
        request: &RequestTypeSpecific,
    ) -> ResponseSpecific {
        match request {
            RequestTypeSpecific::Ping => ResponseSpecific::Ping,
            RequestTypeSpecific::Store(StoreRequestArguments { key, value }) => {
                if !key.fits(self.bit_length) {
                    debug!(?key, from = ?from.map(Contact::id), "Store key outside the keyspace");

                    return ResponseSpecific::Error(ErrorSpecific {
                        code: 400,
                        description: format!("key does not fit in {} bits", self.bit_length),
                    });
                }

                self.values.put(*key, value.clone());

                ResponseSpecific::Store
            }
            RequestTypeSpecific::FindNode(FindNodeRequestArguments { target }) => {
                ResponseSpecific::FindNode(FindNodeResponseArguments {
                    contacts: self.closest(routing_table, from, target),
                })
            }
            RequestTypeSpecific::FindValue(FindValueRequestArguments { key }) => {
                ResponseSpecific::FindValue(match self.values.get(key) {
                    Some(value) => FindValueResponseArguments::Value(value.clone()),
                    None => FindValueResponseArguments::Contacts(self.closest(routing_table, from, key)),
                })
            }
            // Status belongs to the node, not to its server.
            RequestTypeSpecific::Info => ResponseSpecific::Error(ErrorSpecific {
                code: 501,
                description: "info is answered by the node".to_string(),
            }),
        }
    }
}
