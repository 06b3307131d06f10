use std::vec::IntoIter;

use crate::common::{Contact, Id};

/// Contacts kept sorted by their distance to a target, without duplicates.
///
/// Since `xor` with a fixed target is a bijection, two contacts are at the
/// same distance only if they have the same id.
#[derive(Debug, Clone)]
pub struct ClosestContacts {
    target: Id,
    contacts: Vec<Contact>,
}

impl ClosestContacts {
    pub fn new(target: Id) -> Self {
        Self {
            target,
            contacts: Vec::with_capacity(64),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Closest contact so far.
    pub fn first(&self) -> Option<&Contact> {
        self.contacts.first()
    }

    /// Distance of the closest contact so far.
    pub fn best_distance(&self) -> Option<Id> {
        self.first().map(|contact| contact.id().xor(&self.target))
    }

    // === Public Methods ===

    /// Insert `contact` at its place, returning `false` if it was already there.
    pub fn add(&mut self, contact: Contact) -> bool {
        let seek = contact.id().xor(&self.target);

        match self
            .contacts
            .binary_search_by(|probe| probe.id().xor(&self.target).cmp(&seek))
        {
            Ok(_) => false,
            Err(pos) => {
                self.contacts.insert(pos, contact);
                true
            }
        }
    }

    pub fn remove(&mut self, id: &Id) -> Option<Contact> {
        let seek = id.xor(&self.target);

        self.contacts
            .binary_search_by(|probe| probe.id().xor(&self.target).cmp(&seek))
            .ok()
            .map(|pos| self.contacts.remove(pos))
    }

    pub fn contains(&self, id: &Id) -> bool {
        let seek = id.xor(&self.target);

        self.contacts
            .binary_search_by(|probe| probe.id().xor(&self.target).cmp(&seek))
            .is_ok()
    }

    /// The closest `count` contacts.
    pub fn take(&self, count: usize) -> Vec<Contact> {
        self.contacts.iter().take(count).cloned().collect()
    }
}

impl IntoIterator for ClosestContacts {
    type Item = Contact;
    type IntoIter = IntoIter<Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.into_iter()
    }
}

impl<'a> IntoIterator for &'a ClosestContacts {
    type Item = &'a Contact;
    type IntoIter = std::slice::Iter<'a, Contact>;

    fn into_iter(self) -> Self::IntoIter {
        self.contacts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add() {
        let target = Id::random(160);

        let mut closest = ClosestContacts::new(target);

        for _ in 0..10 {
            let contact = Contact::random(160);
            assert!(closest.add(contact.clone()));
            assert!(!closest.add(contact));
        }

        assert_eq!(closest.len(), 10);

        let distances = closest
            .contacts()
            .iter()
            .map(|c| c.id().xor(&target))
            .collect::<Vec<_>>();

        let mut sorted = distances.clone();
        sorted.sort();

        assert_eq!(sorted, distances);
        assert_eq!(closest.best_distance(), Some(sorted[0]));
    }

    #[test]
    fn remove() {
        let mut closest = ClosestContacts::new(Id::from(0));

        for id in [5_u64, 1, 9] {
            closest.add(Contact::new(Id::from(id), "", 0));
        }

        assert!(closest.remove(&Id::from(1)).is_some());
        assert!(closest.remove(&Id::from(1)).is_none());
        assert!(!closest.contains(&Id::from(1)));
        assert_eq!(closest.first().unwrap().id(), &Id::from(5));
        assert_eq!(closest.take(1).len(), 1);
    }
}
