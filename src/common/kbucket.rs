//! Recency ordered k-buckets

use std::slice::Iter;

use tracing::{debug, trace};

use crate::common::{shared_prefix_bit_length, Contact, Id};

/// Outcome of offering a contact to a [KBucket] or a
/// [RoutingTable](crate::common::RoutingTable).
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    /// The contact was appended at the tail.
    Inserted,
    /// The contact was already known; it moved to the tail.
    Refreshed,
    /// The bucket is full. Its `head` has to be probed before the
    /// contact can be accepted.
    BucketFull { head: Contact },
    /// The unresponsive head was evicted and the contact took its place.
    Replaced { evicted: Contact },
    /// The head answered its probe, so the contact was not added.
    Rejected,
    /// The contact can never be part of this table (our own id or an id
    /// outside the keyspace).
    Ignored,
}

/// Kbuckets are similar to LRU caches that checks and evicts unresponsive nodes,
/// without dropping any responsive nodes in the process.
#[derive(Debug, Clone)]
pub struct KBucket {
    /// Contacts in the k-bucket, sorted by the least recently seen.
    contacts: Vec<Contact>,
    k: usize,
    splittable: bool,
}

impl KBucket {
    pub fn new(k: usize) -> Self {
        KBucket {
            contacts: Vec::with_capacity(k),
            k,
            splittable: true,
        }
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.contacts.len() >= self.k
    }

    /// Maximum number of contacts this bucket holds at rest.
    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn is_splittable(&self) -> bool {
        self.splittable
    }

    /// Least recently seen contact.
    pub fn head(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    /// Most recently seen contact.
    pub fn tail(&self) -> Option<&Contact> {
        self.contacts.last()
    }

    pub fn iter(&self) -> Iter<'_, Contact> {
        self.contacts.iter()
    }

    pub fn find_contact_by_id(&self, id: &Id) -> Option<&Contact> {
        self.contacts.iter().find(|contact| contact.id() == id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.find_contact_by_id(id).is_some()
    }

    // === Public Methods ===

    /// Add a contact at the tail, or move an existing one there.
    ///
    /// Never drops a contact silently: a full bucket answers with
    /// [Insertion::BucketFull] and leaves the decision to
    /// [Self::attempt_eviction].
    pub fn add(&mut self, mut incoming: Contact) -> Insertion {
        if let Some(index) = self.position(incoming.id()) {
            self.contacts.remove(index);
            incoming.seen();
            self.contacts.push(incoming);

            Insertion::Refreshed
        } else if !self.is_full() {
            incoming.seen();
            self.contacts.push(incoming);

            Insertion::Inserted
        } else {
            match self.head() {
                Some(head) => Insertion::BucketFull { head: head.clone() },
                // Only reachable with k = 0.
                None => Insertion::Rejected,
            }
        }
    }

    /// Remove a contact by id. No-op if it is absent.
    pub fn delete(&mut self, id: &Id) -> Option<Contact> {
        self.position(id).map(|index| self.contacts.remove(index))
    }

    /// Freeze this bucket; there is no way back.
    pub fn make_unsplittable(&mut self) {
        self.splittable = false;
    }

    /// Returns `true` if any contact does not share exactly `bucket_index`
    /// leading bits with `local_id`, meaning the contacts belong at different
    /// depths and a split would separate them.
    pub fn is_redistributable(&self, local_id: &Id, bucket_index: usize, bit_length: usize) -> bool {
        self.contacts
            .iter()
            .any(|contact| shared_prefix_bit_length(local_id, contact.id(), bit_length) != bucket_index)
    }

    /// Restore the head-to-tail recency order, oldest first.
    pub fn sort_by_seen(&mut self) {
        self.contacts.sort_by_key(|contact| contact.last_seen());
    }

    /// Refresh the contact with this id in place, without reordering.
    pub fn touch(&mut self, id: &Id) -> bool {
        match self.contacts.iter_mut().find(|contact| contact.id() == id) {
            Some(contact) => {
                contact.seen();
                true
            }
            None => false,
        }
    }

    /// Decide between the head and a `candidate` when the bucket is full.
    ///
    /// `probe` reports whether the head is alive. A live head is refreshed and
    /// the candidate rejected; a dead head is evicted and the candidate
    /// appended. Returns the evicted contact, if any.
    pub fn attempt_eviction<P>(&mut self, candidate: Contact, probe: P) -> Option<Contact>
    where
        P: FnOnce(&Contact) -> bool,
    {
        debug_assert!(self.is_full(), "eviction is only for full buckets");

        if self.contacts.is_empty() {
            // Only reachable with k = 0.
            return None;
        }

        if self.contains(candidate.id()) {
            self.add(candidate);
            return None;
        }

        if probe(&self.contacts[0]) {
            let mut head = self.contacts.remove(0);
            head.seen();

            trace!(head = ?head.id(), candidate = ?candidate.id(), "Head is alive, rejecting candidate");

            self.contacts.push(head);

            None
        } else {
            let evicted = self.contacts.remove(0);

            debug!(evicted = ?evicted.id(), candidate = ?candidate.id(), "Evicted unresponsive head");

            self.contacts.push(candidate);

            debug_assert!(self.contacts.len() <= self.k);

            Some(evicted)
        }
    }

    /// Move every contact sharing more than `bucket_index` bits with
    /// `local_id` into a new bucket, keeping their recency order.
    pub(crate) fn split_off(&mut self, local_id: &Id, bucket_index: usize, bit_length: usize) -> KBucket {
        let (deeper, stay): (Vec<_>, Vec<_>) = self
            .contacts
            .drain(..)
            .partition(|contact| shared_prefix_bit_length(local_id, contact.id(), bit_length) > bucket_index);

        self.contacts = stay;

        KBucket {
            contacts: deeper,
            k: self.k,
            splittable: true,
        }
    }

    // === Private Methods ===

    fn position(&self, id: &Id) -> Option<usize> {
        self.contacts.iter().position(|contact| contact.id() == id)
    }
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use super::*;

    const BIT_LENGTH: usize = 6;
    const K: usize = 8;

    fn contact(id: u64) -> Contact {
        Contact::new(Id::from(id), "", 0)
    }

    fn filled(ids: &[u64]) -> KBucket {
        let mut bucket = KBucket::new(K);

        for id in ids {
            assert_eq!(bucket.add(contact(*id)), Insertion::Inserted);
        }

        bucket
    }

    fn ids(bucket: &KBucket) -> Vec<u64> {
        bucket.iter().map(|c| c.id().low_u64()).collect()
    }

    #[test]
    fn new_bucket() {
        let bucket = KBucket::new(K);

        assert!(bucket.is_empty());
        assert!(bucket.is_splittable());
        assert!(bucket.head().is_none());
        assert!(bucket.tail().is_none());
    }

    #[test]
    fn delete() {
        let mut bucket = filled(&[0]);

        assert!(bucket.delete(&Id::from(1)).is_none());
        assert_eq!(bucket.len(), 1);

        assert!(bucket.delete(&Id::from(0)).is_some());
        assert!(bucket.is_empty());
    }

    #[test]
    fn head_and_tail() {
        let mut bucket = filled(&[0]);
        assert_eq!(bucket.head(), bucket.tail());

        bucket.add(contact(1));
        assert_eq!(bucket.head().unwrap().id(), &Id::from(0));
        assert_eq!(bucket.tail().unwrap().id(), &Id::from(1));
    }

    #[test]
    fn re_adding_moves_to_tail() {
        let mut bucket = filled(&[0, 1, 2]);

        assert_eq!(bucket.add(contact(0)), Insertion::Refreshed);

        assert_eq!(ids(&bucket), vec![1, 2, 0]);
    }

    #[test]
    fn full_bucket_does_not_grow() {
        let mut bucket = filled(&[0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(bucket.is_full());

        let result = bucket.add(contact(8));

        assert_eq!(result, Insertion::BucketFull { head: contact(0) });
        assert_eq!(bucket.len(), K);
        assert!(!bucket.contains(&Id::from(8)));
    }

    #[test]
    fn not_full() {
        assert!(!filled(&[0]).is_full());
    }

    #[test]
    fn find_contact_by_id() {
        let bucket = filled(&[0]);

        assert_eq!(bucket.find_contact_by_id(&Id::from(0)), Some(&contact(0)));
        assert!(bucket.find_contact_by_id(&Id::from(1)).is_none());
    }

    #[test]
    fn make_unsplittable() {
        let mut bucket = KBucket::new(K);
        bucket.make_unsplittable();

        assert!(!bucket.is_splittable());
    }

    #[test]
    fn is_redistributable() {
        let bucket = filled(&[63, 62, 61, 60, 59, 58, 57, 31]);

        assert!(bucket.is_redistributable(&Id::from(0), 0, BIT_LENGTH));
    }

    #[test]
    fn is_not_redistributable() {
        let bucket = filled(&[63, 62, 61, 60, 59, 58, 57, 56]);

        assert!(!bucket.is_redistributable(&Id::from(0), 0, BIT_LENGTH));
    }

    #[test]
    fn sort_by_seen() {
        let mut bucket = filled(&[0, 7]);

        std::thread::sleep(Duration::from_millis(2));
        assert!(bucket.touch(&Id::from(0)));
        bucket.sort_by_seen();

        assert_eq!(bucket.head().unwrap().id(), &Id::from(7));
        assert_eq!(bucket.tail().unwrap().id(), &Id::from(0));
    }

    #[test]
    fn added_contact_is_most_recent() {
        let mut bucket = KBucket::new(K);

        bucket.add(contact(1));
        // Parsed from a response a while ago.
        bucket.add(contact(2).with_last_seen(Instant::now() - Duration::from_secs(5)));
        bucket.sort_by_seen();

        assert_eq!(bucket.head().unwrap().id(), &Id::from(1));
        assert_eq!(bucket.tail().unwrap().id(), &Id::from(2));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "eviction is only for full buckets")]
    fn attempt_eviction_requires_full_bucket() {
        let mut bucket = filled(&[63]);

        bucket.attempt_eviction(contact(62), |_| false);
    }

    #[test]
    fn attempt_eviction_pingable() {
        let mut bucket = filled(&[63, 62, 61, 60, 59, 58, 57, 56]);

        let evicted = bucket.attempt_eviction(contact(55), |head| {
            assert_eq!(head.id(), &Id::from(63));
            true
        });

        assert!(evicted.is_none());
        assert_eq!(bucket.len(), K);
        assert_eq!(bucket.tail().unwrap().id(), &Id::from(63));
        assert_eq!(bucket.head().unwrap().id(), &Id::from(62));
        assert!(!bucket.contains(&Id::from(55)));
    }

    #[test]
    fn attempt_eviction_not_pingable() {
        let mut bucket = filled(&[63, 62, 61, 60, 59, 58, 57, 56]);

        let evicted = bucket.attempt_eviction(contact(55), |_| false);

        assert_eq!(evicted, Some(contact(63)));
        assert_eq!(bucket.len(), K);
        assert_eq!(bucket.tail().unwrap().id(), &Id::from(55));
        assert_eq!(bucket.head().unwrap().id(), &Id::from(62));
        assert!(!bucket.contains(&Id::from(63)));
    }

    #[test]
    fn split_off_keeps_order() {
        let mut bucket = filled(&[63, 31, 62, 15, 61]);

        let deeper = bucket.split_off(&Id::from(0), 0, BIT_LENGTH);

        assert_eq!(ids(&bucket), vec![63, 62, 61]);
        assert_eq!(ids(&deeper), vec![31, 15]);
        assert!(deeper.is_splittable());
    }
}
