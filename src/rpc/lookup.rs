//! State of one iterative lookup.

use std::collections::HashSet;

use tracing::{debug, trace};

use super::ClosestContacts;
use crate::common::{Contact, Id};

/// An iterative process of concurrently sending a request to the closest known contacts to
/// the target, merging closer contacts discovered in the responses, and
/// repeating this process until no closer contacts are found.
///
/// Owned by a single lookup call and dropped at its end.
#[derive(Debug)]
pub(crate) struct Lookup {
    local_id: Id,
    bit_length: usize,
    k: usize,
    alpha: usize,
    /// Candidates, closest first.
    shortlist: ClosestContacts,
    /// Contacts that answered, closest first.
    responders: ClosestContacts,
    queried: HashSet<Id>,
    best: Option<Id>,
    /// Best distance after each round.
    history: Vec<Id>,
    /// Query every unqueried contact among the `k` closest, not just `alpha`.
    finishing: bool,
    done: bool,
}

impl Lookup {
    pub fn new(local_id: Id, target: Id, seed: Vec<Contact>, bit_length: usize, k: usize, alpha: usize) -> Self {
        let mut shortlist = ClosestContacts::new(target);

        for contact in seed {
            if contact.id() != &local_id {
                shortlist.add(contact);
            }
        }

        trace!(?target, seed = shortlist.len(), "New lookup");

        Self {
            local_id,
            bit_length,
            k,
            alpha,
            best: shortlist.best_distance(),
            shortlist,
            responders: ClosestContacts::new(target),
            queried: HashSet::new(),
            history: Vec::new(),
            finishing: false,
            done: false,
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.shortlist.target()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Best distance to the target after each completed round.
    pub fn history(&self) -> &[Id] {
        &self.history
    }

    pub fn responders(&self) -> &ClosestContacts {
        &self.responders
    }

    /// The `k` closest contacts that answered.
    pub fn closest(&self) -> Vec<Contact> {
        self.responders.take(self.k)
    }

    /// Returns `true` once every one of the `k` closest candidates was
    /// queried. Those that failed are gone from the shortlist, so the rest
    /// have all responded.
    pub fn is_settled(&self) -> bool {
        self.shortlist
            .contacts()
            .iter()
            .take(self.k)
            .all(|contact| self.queried.contains(contact.id()))
    }

    // === Public Methods ===

    /// Pick the contacts to query next and mark them as queried.
    ///
    /// Returns an empty list, and finishes the lookup, once there is nobody
    /// left to ask.
    pub fn next_round(&mut self) -> Vec<Contact> {
        if self.done {
            return Vec::new();
        }

        let width = if self.finishing { self.k } else { self.alpha };

        let round = self
            .shortlist
            .contacts()
            .iter()
            .take(self.k)
            .filter(|contact| !self.queried.contains(contact.id()))
            .take(width)
            .cloned()
            .collect::<Vec<_>>();

        if round.is_empty() {
            self.finish();
        }

        for contact in &round {
            self.queried.insert(*contact.id());
        }

        round
    }

    /// Merge the contacts returned by a responding contact.
    pub fn responded(&mut self, from: Contact, contacts: Vec<Contact>) {
        for contact in contacts {
            let id = contact.id();

            // Queried contacts are either in the shortlist already, or failed.
            if id != &self.local_id && id.fits(self.bit_length) && !self.queried.contains(id) {
                self.shortlist.add(contact);
            }
        }

        self.responders.add(from);
    }

    /// Drop a contact that did not respond.
    pub fn failed(&mut self, contact: &Contact) {
        self.shortlist.remove(contact.id());
    }

    /// Settle the round: record progress and decide whether to go on.
    pub fn end_round(&mut self) {
        if self.done {
            return;
        }

        let improved = match (self.best, self.shortlist.best_distance()) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(best), Some(distance)) => distance < best,
        };

        if improved {
            self.best = self.shortlist.best_distance();
        }

        if let Some(best) = self.best {
            self.history.push(best);
        }

        if self.is_settled() {
            self.finish();
        } else {
            // A sweep that turned up closer contacts goes back to alpha wide rounds.
            self.finishing = !improved;
        }
    }

    /// Stop the lookup, e.g. when its deadline passed.
    pub fn finish(&mut self) {
        if !self.done {
            debug!(
                target = ?self.target(),
                candidates = self.shortlist.len(),
                queried = self.queried.len(),
                responders = self.responders.len(),
                rounds = self.history().len(),
                "Done lookup"
            );
        }

        self.done = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(id: u64) -> Contact {
        Contact::new(Id::from(id), "", 0)
    }

    fn ids(contacts: &[Contact]) -> Vec<u64> {
        contacts.iter().map(|c| c.id().low_u64()).collect()
    }

    #[test]
    fn rounds_are_alpha_wide() {
        let mut lookup = Lookup::new(Id::from(0), Id::from(1), vec![contact(60), contact(50), contact(40), contact(30)], 6, 8, 3);

        assert_eq!(ids(&lookup.next_round()), vec![30, 40, 50]);
    }

    #[test]
    fn seed_skips_local_id() {
        let mut lookup = Lookup::new(Id::from(0), Id::from(1), vec![contact(0), contact(2)], 6, 8, 3);

        assert_eq!(ids(&lookup.next_round()), vec![2]);
    }

    #[test]
    fn finishes_after_a_round_without_progress() {
        let mut lookup = Lookup::new(Id::from(0), Id::from(0), vec![contact(32), contact(33)], 6, 8, 1);

        let round = lookup.next_round();
        assert_eq!(ids(&round), vec![32]);
        lookup.responded(contact(32), vec![contact(8), contact(40)]);
        lookup.end_round();
        assert!(!lookup.is_done());

        // Nothing closer than 8 comes back.
        let round = lookup.next_round();
        assert_eq!(ids(&round), vec![8]);
        lookup.responded(contact(8), vec![contact(9)]);
        lookup.end_round();
        assert!(!lookup.is_done());

        // Final sweep over everything not queried yet.
        let round = lookup.next_round();
        assert_eq!(ids(&round), vec![9, 33, 40]);
        for contact in round {
            lookup.failed(&contact);
        }
        lookup.end_round();

        assert!(lookup.is_done());
        assert!(lookup.next_round().is_empty());
        assert_eq!(ids(&lookup.closest()), vec![8, 32]);
        assert_eq!(lookup.history(), &[Id::from(8), Id::from(8), Id::from(8)]);
    }

    #[test]
    fn done_when_k_responded() {
        let mut lookup = Lookup::new(Id::from(0), Id::from(0), vec![contact(10), contact(11)], 6, 2, 2);

        for contact in lookup.next_round() {
            lookup.responded(contact, vec![]);
        }
        lookup.end_round();

        assert!(lookup.is_done());
    }

    #[test]
    fn keeps_going_while_closer_contacts_are_unqueried() {
        // k responders after the first round, but both are far from the target.
        let mut lookup = Lookup::new(Id::from(0), Id::from(3), vec![contact(128), contact(192)], 8, 2, 3);

        assert_eq!(ids(&lookup.next_round()), vec![128, 192]);
        lookup.responded(contact(128), vec![contact(1), contact(2)]);
        lookup.responded(contact(192), vec![]);
        lookup.end_round();

        assert!(!lookup.is_done());
        assert!(!lookup.is_settled());

        assert_eq!(ids(&lookup.next_round()), vec![2, 1]);
        lookup.responded(contact(2), vec![contact(128)]);
        lookup.responded(contact(1), vec![]);
        lookup.end_round();

        assert!(lookup.is_done());
        assert_eq!(ids(&lookup.closest()), vec![2, 1]);
    }

    #[test]
    fn sweep_that_finds_closer_contacts_continues() {
        let mut lookup = Lookup::new(Id::from(0), Id::from(0), vec![contact(40), contact(48)], 6, 2, 1);

        assert_eq!(ids(&lookup.next_round()), vec![40]);
        lookup.responded(contact(40), vec![contact(44)]);
        lookup.end_round();
        assert!(!lookup.is_done());

        // No progress, so the next round sweeps the k closest.
        assert_eq!(ids(&lookup.next_round()), vec![44]);
        lookup.responded(contact(44), vec![contact(4)]);
        lookup.end_round();
        assert!(!lookup.is_done());

        assert_eq!(ids(&lookup.next_round()), vec![4]);
        lookup.responded(contact(4), vec![]);
        lookup.end_round();

        assert!(lookup.is_done());
        assert_eq!(ids(&lookup.closest()), vec![4, 40]);
        assert_eq!(lookup.history(), &[Id::from(40), Id::from(4), Id::from(4)]);
    }

    #[test]
    fn empty_seed_is_done() {
        let mut lookup = Lookup::new(Id::from(0), Id::from(5), vec![], 6, 8, 3);

        assert!(lookup.next_round().is_empty());
        assert!(lookup.is_done());
        assert!(lookup.closest().is_empty());
    }

    #[test]
    fn ignores_contacts_outside_keyspace() {
        let mut lookup = Lookup::new(Id::from(0), Id::from(0), vec![contact(10)], 6, 8, 3);

        lookup.next_round();
        lookup.responded(contact(10), vec![contact(64), contact(0)]);

        assert!(lookup.next_round().is_empty());
    }
}
