//! Local Dht node: routing table, server and lookups over a [NetworkAdapter].

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::thread;
use std::time::Instant;

use bytes::Bytes;
use flume::Receiver;
use tracing::{debug, info, trace};

use crate::common::{
    Contact, FindValueRequestArguments, FindValueResponseArguments, Id, Insertion,
    RequestSpecific, RequestTypeSpecific, ResponseSpecific, RoutingTable,
};
use crate::rpc::lookup::Lookup;
use crate::rpc::{Info, NetworkAdapter, StoreOutcome};
use crate::server::{DefaultServer, Server};
use crate::{Config, Error, Result};

#[derive(Debug)]
struct NodeInner {
    config: Config,
    contact: Contact,
    routing_table: RwLock<RoutingTable>,
    network: Arc<dyn NetworkAdapter>,
    server: Mutex<Box<dyn Server>>,
}

/// A Kademlia node.
///
/// Cheap to clone; clones share the same routing table and server.
#[derive(Debug, Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Non owning handle to a [Node].
#[derive(Debug, Clone)]
pub(crate) struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(|inner| Node { inner })
    }
}

/// What a peer answered during a lookup.
#[derive(Debug)]
enum Answer {
    Contacts(Vec<Contact>),
    Value(Bytes),
}

impl Node {
    /// Create a node reachable at `contact`, answering requests with a [DefaultServer].
    pub fn new(config: Config, contact: Contact, network: Arc<dyn NetworkAdapter>) -> Result<Node> {
        let server = Box::new(DefaultServer::new(&config));

        Self::with_server(config, contact, network, server)
    }

    /// Create a node with a custom [Server].
    pub fn with_server(
        config: Config,
        contact: Contact,
        network: Arc<dyn NetworkAdapter>,
        server: Box<dyn Server>,
    ) -> Result<Node> {
        config.validate()?;

        if !contact.id().fits(config.bit_length) {
            return Err(Error::IdOutOfKeyspace {
                id: *contact.id(),
                bit_length: config.bit_length,
            });
        }

        let routing_table = RoutingTable::new(*contact.id(), &config);

        Ok(Node {
            inner: Arc::new(NodeInner {
                config,
                contact,
                routing_table: RwLock::new(routing_table),
                network,
                server: Mutex::new(server),
            }),
        })
    }

    // === Getters ===

    pub fn id(&self) -> Id {
        *self.inner.contact.id()
    }

    /// The contact other nodes reach this node at.
    pub fn contact(&self) -> &Contact {
        &self.inner.contact
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Snapshot of the routing table.
    pub fn routing_table(&self) -> RoutingTable {
        self.read_table().clone()
    }

    /// Run `f` against the routing table without cloning it.
    pub fn with_routing_table<T, F: FnOnce(&RoutingTable) -> T>(&self, f: F) -> T {
        f(&self.read_table())
    }

    /// Local status, as answered to `info` requests.
    pub fn info(&self) -> Info {
        Info::from(self)
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.inner))
    }

    // === Public Methods ===

    /// Add or refresh `contact` in the routing table.
    ///
    /// When its bucket is full, the bucket's least recently seen contact is
    /// pinged first, without holding the routing table lock, and evicted if
    /// it does not answer.
    pub fn observe(&self, contact: Contact) -> Insertion {
        let head = match self.write_table().try_add_contact(contact.clone()) {
            Insertion::BucketFull { head } => head,
            insertion => return insertion,
        };

        let alive = self.inner.network.ping(&head, self.contact());

        // The head may have changed while we were waiting, in which case the
        // new head is kept.
        self.write_table()
            .add_contact(contact, |probed| probed != &head || alive)
    }

    /// Ping `contact`, adding it to the routing table if it answers.
    pub fn ping(&self, contact: &Contact) -> bool {
        let alive = self.inner.network.ping(contact, self.contact());

        if alive {
            self.observe(contact.clone());
        }

        alive
    }

    /// Join the network through `seed`: add it, then look up our own id to
    /// fill the routing table, and to announce ourselves to our neighbours.
    pub fn bootstrap(&self, seed: &Contact) -> bool {
        if !self.ping(seed) {
            info!(seed = ?seed.id(), "Bootstrap seed is unreachable");
            return false;
        }

        let closest = self.find_node(self.id());

        info!(
            id = ?self.id(),
            seed = ?seed.id(),
            closest = closest.len(),
            contacts = self.with_routing_table(RoutingTable::size),
            "Bootstrapped"
        );

        true
    }

    /// The `k` closest responding contacts to `target`.
    pub fn find_node(&self, target: Id) -> Vec<Contact> {
        self.iterate_find_node(target, None).closest()
    }

    /// Same as [Self::find_node], but gives up at `deadline` with whatever
    /// responded so far.
    pub fn find_node_with_deadline(&self, target: Id, deadline: Instant) -> Vec<Contact> {
        self.iterate_find_node(target, Some(deadline)).closest()
    }

    /// Look up the value stored under `key`.
    ///
    /// On success the value is also stored at the closest contact that
    /// answered without it.
    pub fn find_value(&self, key: Id) -> Option<Bytes> {
        self.find_value_inner(key, None)
    }

    /// Same as [Self::find_value], but gives up at `deadline`.
    pub fn find_value_with_deadline(&self, key: Id, deadline: Instant) -> Option<Bytes> {
        self.find_value_inner(key, Some(deadline))
    }

    /// Store `value` at the `k` closest contacts to `key`.
    ///
    /// Best effort: failed stores are not retried, see [StoreOutcome::stored_at].
    pub fn store(&self, key: Id, value: Bytes) -> StoreOutcome {
        let closest = self.find_node(key);

        let receiver = self.spawn_requests(&closest, move |node, contact| {
            node.inner
                .network
                .store(key, value.clone(), contact, node.contact())
                .then_some(())
        });

        let stored_at = receiver
            .iter()
            .take(closest.len())
            .filter_map(|(contact, stored)| stored.map(|_| *contact.id()))
            .collect::<Vec<_>>();

        debug!(?key, closest = closest.len(), stored = stored_at.len(), "Stored value");

        StoreOutcome::new(key, closest, stored_at)
    }

    /// Answer an inbound request, adding or refreshing its sender first.
    pub fn handle_request(&self, request: RequestSpecific) -> ResponseSpecific {
        if let RequestTypeSpecific::Info = request.request_type {
            return ResponseSpecific::Info(self.info());
        }

        if let Some(sender) = &request.sender {
            self.observe(sender.clone());
        }

        trace!(from = ?request.sender.as_ref().map(Contact::id), ?request.request_type, "Handling request");

        let table = self.read_table();
        let mut server = self.inner.server.lock().unwrap_or_else(PoisonError::into_inner);

        server.handle_request(&table, request.sender.as_ref(), &request.request_type)
    }

    // === Private Methods ===

    fn read_table(&self) -> RwLockReadGuard<'_, RoutingTable> {
        self.inner.routing_table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, RoutingTable> {
        self.inner.routing_table.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Value this node holds itself, if any.
    fn local_value(&self, key: &Id) -> Option<Bytes> {
        let request = RequestTypeSpecific::FindValue(FindValueRequestArguments { key: *key });

        let table = self.read_table();
        let mut server = self.inner.server.lock().unwrap_or_else(PoisonError::into_inner);

        match server.handle_request(&table, None, &request) {
            ResponseSpecific::FindValue(FindValueResponseArguments::Value(value)) => Some(value),
            _ => None,
        }
    }

    fn find_value_inner(&self, key: Id, deadline: Option<Instant>) -> Option<Bytes> {
        if let Some(value) = self.local_value(&key) {
            return Some(value);
        }

        let (lookup, found) = self.iterate(key, deadline, move |node, contact| {
            match node.inner.network.find_value(key, contact, node.contact())? {
                FindValueResponseArguments::Value(value) => Some(Answer::Value(value)),
                FindValueResponseArguments::Contacts(contacts) => Some(Answer::Contacts(contacts)),
            }
        });

        let (holder, value) = found?;

        // Responders only ever include contacts that answered without the value.
        if let Some(closest) = lookup.responders().first() {
            let cached = self
                .inner
                .network
                .store(key, value.clone(), closest, self.contact());

            debug!(?key, holder = ?holder.id(), cache = ?closest.id(), cached, "Cached value");
        }

        Some(value)
    }

    fn iterate_find_node(&self, target: Id, deadline: Option<Instant>) -> Lookup {
        let (lookup, _) = self.iterate(target, deadline, move |node, contact| {
            node.inner
                .network
                .find_node(target, contact, node.contact())
                .map(Answer::Contacts)
        });

        lookup
    }

    /// Drive a [Lookup] to its end, one round of parallel requests at a time.
    ///
    /// Returns early with the responder and the value as soon as `request`
    /// yields an [Answer::Value].
    fn iterate<F>(&self, target: Id, deadline: Option<Instant>, request: F) -> (Lookup, Option<(Contact, Bytes)>)
    where
        F: Fn(&Node, &Contact) -> Option<Answer> + Clone + Send + 'static,
    {
        let config = self.config();
        let seed = self.with_routing_table(|table| table.find_closest_contacts(&target, config.alpha));

        let mut lookup = Lookup::new(self.id(), target, seed, config.bit_length, config.k, config.alpha);

        while !lookup.is_done() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                lookup.finish();
                break;
            }

            let round = lookup.next_round();
            if round.is_empty() {
                break;
            }

            let receiver = self.spawn_requests(&round, request.clone());

            let mut pending = round.len();
            while pending > 0 {
                let received = match deadline {
                    Some(deadline) => receiver.recv_deadline(deadline).ok(),
                    None => receiver.recv().ok(),
                };

                let Some((contact, answer)) = received else {
                    break;
                };
                pending -= 1;

                match answer {
                    Some(Answer::Contacts(contacts)) => lookup.responded(contact, contacts),
                    Some(Answer::Value(value)) => {
                        lookup.finish();
                        return (lookup, Some((contact, value)));
                    }
                    None => lookup.failed(&contact),
                }
            }

            if pending > 0 {
                // Deadline passed; late responses only refresh the routing table.
                lookup.finish();
                break;
            }

            lookup.end_round();
        }

        (lookup, None)
    }

    /// Send `request` to each contact on its own thread.
    ///
    /// Every contact yields exactly one message on the returned channel,
    /// `None` if it did not answer. Contacts that answer are fed to
    /// [Self::observe] by the request thread itself, even if nobody is
    /// listening anymore.
    fn spawn_requests<T, F>(&self, contacts: &[Contact], request: F) -> Receiver<(Contact, Option<T>)>
    where
        T: Send + 'static,
        F: Fn(&Node, &Contact) -> Option<T> + Clone + Send + 'static,
    {
        let (sender, receiver) = flume::unbounded();

        for contact in contacts {
            let node = self.clone();
            let tx = sender.clone();
            let request = request.clone();
            let moved = contact.clone();

            let spawned = thread::Builder::new()
                .name("xordht-rpc".to_string())
                .spawn(move || {
                    let answer = request(&node, &moved);

                    if answer.is_some() {
                        node.observe(moved.clone());
                    }

                    let _ = tx.send((moved, answer));
                });

            if let Err(error) = spawned {
                debug!(to = ?contact.id(), ?error, "Could not spawn request thread");
                let _ = sender.send((contact.clone(), None));
            }
        }

        receiver
    }
}
