//! Kademlia routing table with lazily split k-buckets

use tracing::{debug, trace};

use crate::common::{shared_prefix_bit_length, sort_by_distance, Contact, Id, Insertion, KBucket};
use crate::Config;

#[derive(Debug, Clone)]
/// Kademlia routing table.
///
/// Starts with a single bucket. Bucket `i` below the last one holds contacts
/// sharing exactly `i` leading bits with the local id; the last bucket holds
/// every contact sharing at least as many bits, including the local node's
/// own neighbourhood, and is the only one that ever splits.
pub struct RoutingTable {
    id: Id,
    bit_length: usize,
    buckets: Vec<KBucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] for the local `id`.
    pub fn new(id: Id, config: &Config) -> Self {
        RoutingTable {
            id,
            bit_length: config.bit_length,
            buckets: vec![KBucket::new(config.k)],
        }
    }

    // === Getters ===

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn local_id(&self) -> &Id {
        &self.id
    }

    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn bucket(&self, index: usize) -> Option<&KBucket> {
        self.buckets.get(index)
    }

    /// Return the number of contacts in this routing table.
    pub fn size(&self) -> usize {
        self.buckets.iter().map(KBucket::len).sum()
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(KBucket::is_empty)
    }

    /// Iterate over all contacts, bucket by bucket, least recently seen first.
    pub fn contacts(&self) -> impl Iterator<Item = &Contact> {
        self.buckets.iter().flat_map(KBucket::iter)
    }

    /// Index of the bucket responsible for `id`.
    pub fn bucket_index(&self, id: &Id) -> usize {
        let depth = shared_prefix_bit_length(&self.id, id, self.bit_length);

        depth.min(self.buckets.len() - 1)
    }

    pub fn find_contact(&self, id: &Id) -> Option<&Contact> {
        self.buckets[self.bucket_index(id)].find_contact_by_id(id)
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.find_contact(id).is_some()
    }

    // === Public Methods ===

    /// Add or refresh a contact, splitting buckets as needed, and falling
    /// back to the eviction policy of the responsible bucket when it is full.
    ///
    /// `probe` is asked whether the bucket's head is still alive.
    pub fn add_contact<P>(&mut self, contact: Contact, probe: P) -> Insertion
    where
        P: FnOnce(&Contact) -> bool,
    {
        match self.try_add_contact(contact.clone()) {
            Insertion::BucketFull { .. } => {
                let index = self.bucket_index(contact.id());

                match self.buckets[index].attempt_eviction(contact, probe) {
                    Some(evicted) => Insertion::Replaced { evicted },
                    None => Insertion::Rejected,
                }
            }
            insertion => insertion,
        }
    }

    /// Same as [Self::add_contact] but stops short of probing anyone, answering
    /// [Insertion::BucketFull] instead.
    ///
    /// Lets callers probe the head without holding on to the table.
    pub fn try_add_contact(&mut self, contact: Contact) -> Insertion {
        if contact.id() == &self.id {
            // Do not add self to the routing_table
            return Insertion::Ignored;
        }

        if !contact.id().fits(self.bit_length) {
            debug!(id = ?contact.id(), bit_length = self.bit_length, "Ignoring contact outside the keyspace");
            return Insertion::Ignored;
        }

        loop {
            let index = self.bucket_index(contact.id());
            let bucket = &mut self.buckets[index];

            match bucket.add(contact.clone()) {
                Insertion::BucketFull { head } => {
                    if bucket.is_splittable() && bucket.is_redistributable(&self.id, index, self.bit_length) {
                        self.split(index);
                        continue;
                    }

                    return Insertion::BucketFull { head };
                }
                insertion => {
                    trace!(id = ?contact.id(), bucket = index, ?insertion, "Added contact");
                    return insertion;
                }
            }
        }
    }

    /// Remove a contact from this routing table.
    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        let index = self.bucket_index(id);

        self.buckets[index].delete(id)
    }

    /// Refresh `last_seen` of a known contact and move it to its bucket's tail.
    pub fn touch(&mut self, id: &Id) -> bool {
        let index = self.bucket_index(id);
        let bucket = &mut self.buckets[index];

        if bucket.touch(id) {
            bucket.sort_by_seen();
            true
        } else {
            false
        }
    }

    /// Up to `count` known contacts ordered by distance to `target`.
    ///
    /// Equal distances only happen for equal ids, which the table never holds
    /// twice, so the order is total.
    pub fn find_closest_contacts(&self, target: &Id, count: usize) -> Vec<Contact> {
        let mut contacts = self.contacts().cloned().collect::<Vec<_>>();

        sort_by_distance(target, &mut contacts);
        contacts.truncate(count);

        contacts
    }

    // === Private Methods ===

    /// Split the last bucket by the next bit of the prefix.
    fn split(&mut self, index: usize) {
        debug_assert_eq!(index, self.buckets.len() - 1, "only the last bucket covers our own range");

        let local_id = self.id;
        let bit_length = self.bit_length;

        let bucket = &mut self.buckets[index];
        let mut deeper = bucket.split_off(&local_id, index, bit_length);
        bucket.make_unsplittable();

        debug_assert!(!deeper.is_empty(), "split of a redistributable bucket moved nothing");

        // Nothing can ever share more bits than this bucket's without being us.
        if index + 1 >= bit_length.saturating_sub(1) {
            deeper.make_unsplittable();
        }

        debug!(
            index,
            stayed = bucket.len(),
            moved = deeper.len(),
            "Split bucket"
        );

        self.buckets.push(deeper);
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use super::*;

    fn config() -> Config {
        Config::default().with_bit_length(6).with_k(8)
    }

    fn contact(id: u64) -> Contact {
        Contact::new(Id::from(id), "", 0)
    }

    fn table_with(ids: &[u64]) -> RoutingTable {
        let mut table = RoutingTable::new(Id::from(0), &config());

        for id in ids {
            table.add_contact(contact(*id), |_| true);
        }

        table
    }

    #[test]
    fn table_is_empty() {
        let mut table = RoutingTable::new(Id::from(0), &config());
        assert!(table.is_empty());

        table.add_contact(contact(1), |_| true);
        assert!(!table.is_empty());
    }

    #[test]
    fn should_not_add_self() {
        let mut table = RoutingTable::new(Id::from(0), &config());

        assert_eq!(table.add_contact(contact(0), |_| true), Insertion::Ignored);
        assert!(table.is_empty());
    }

    #[test]
    fn should_not_add_outside_keyspace() {
        let mut table = RoutingTable::new(Id::from(0), &config());

        assert_eq!(table.add_contact(contact(64), |_| true), Insertion::Ignored);
        assert!(table.is_empty());
    }

    #[test]
    fn buckets_are_sets() {
        let mut table = table_with(&[5]);

        assert_eq!(table.add_contact(contact(5), |_| true), Insertion::Refreshed);
        assert_eq!(table.size(), 1);
    }

    #[test]
    fn remove() {
        let mut table = table_with(&[5, 6]);

        assert!(table.remove(&Id::from(5)).is_some());
        assert!(!table.contains(&Id::from(5)));
        assert!(table.contains(&Id::from(6)));
        assert!(table.remove(&Id::from(5)).is_none());
    }

    #[test]
    fn splits_when_redistributable() {
        let table = table_with(&[63, 62, 61, 60, 59, 58, 57, 31]);
        assert_eq!(table.bucket_count(), 1);

        // Ninth contact fills past k, and 31 does not belong at depth 0.
        let mut table = table;
        assert_eq!(table.add_contact(contact(56), |_| true), Insertion::Inserted);

        assert_eq!(table.bucket_count(), 2);
        assert_eq!(table.size(), 9);

        let shallow = table.bucket(0).unwrap();
        assert!(!shallow.is_splittable());
        assert_eq!(shallow.len(), 8);
        assert!(!shallow.contains(&Id::from(31)));

        assert!(table.bucket(1).unwrap().contains(&Id::from(31)));
    }

    #[test]
    fn evicts_when_not_redistributable() {
        let mut table = table_with(&[63, 62, 61, 60, 59, 58, 57, 56]);

        assert_eq!(table.try_add_contact(contact(55)), Insertion::BucketFull { head: contact(63) });

        let insertion = table.add_contact(contact(55), |_| false);

        assert_eq!(insertion, Insertion::Replaced { evicted: contact(63) });
        assert_eq!(table.bucket_count(), 1);
        assert!(table.contains(&Id::from(55)));
        assert!(!table.contains(&Id::from(63)));
    }

    #[test]
    fn rejects_when_head_is_alive() {
        let mut table = table_with(&[63, 62, 61, 60, 59, 58, 57, 56]);

        assert_eq!(table.add_contact(contact(55), |_| true), Insertion::Rejected);
        assert_eq!(table.size(), 8);
        assert_eq!(table.bucket(0).unwrap().tail().unwrap().id(), &Id::from(63));
    }

    #[test]
    fn every_contact_in_its_bucket() {
        let mut table = RoutingTable::new(Id::from(0), &config());

        for id in 1..64 {
            table.add_contact(contact(id), |_| true);
        }

        let mut seen = HashSet::new();
        let last = table.bucket_count() - 1;

        for index in 0..table.bucket_count() {
            for contact in table.bucket(index).unwrap().iter() {
                assert!(seen.insert(*contact.id()), "duplicate {:?}", contact.id());

                let depth = shared_prefix_bit_length(table.local_id(), contact.id(), 6);
                if index < last {
                    assert_eq!(depth, index);
                } else {
                    assert!(depth >= index);
                }
            }

            assert!(table.bucket(index).unwrap().len() <= 8);
        }

        assert_eq!(seen.len(), table.size());
        // Depths 0 and 1 hold 32 and 16 ids, more than k = 8.
        assert!(table.size() < 63);
        assert!(table.bucket_count() > 2);
    }

    #[test]
    fn find_closest_contacts() {
        let table = table_with(&[1, 2, 3, 8, 16, 32, 63]);

        let closest = table.find_closest_contacts(&Id::from(3), 3);
        let ids = closest.iter().map(|c| c.id().low_u64()).collect::<Vec<_>>();

        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(table.find_closest_contacts(&Id::from(3), 100).len(), 7);
    }

    #[test]
    fn touch_moves_to_tail() {
        let mut table = table_with(&[63, 62, 61]);

        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(table.touch(&Id::from(63)));
        assert_eq!(table.bucket(0).unwrap().tail().unwrap().id(), &Id::from(63));
        assert!(!table.touch(&Id::from(1)));
    }
}
