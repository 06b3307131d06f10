//! Results of lookups that do more than return contacts.
use crate::common::{Contact, Id};

/// Outcome of [crate::Node::store].
#[derive(Clone, Debug)]
pub struct StoreOutcome {
    key: Id,
    stored_at: Vec<Id>,
    closest: Vec<Contact>,
}

impl StoreOutcome {
    pub fn new(key: Id, closest: Vec<Contact>, stored_at: Vec<Id>) -> Self {
        Self {
            key,
            closest,
            stored_at,
        }
    }

    /// Return the key this value was stored under.
    pub fn key(&self) -> Id {
        self.key
    }

    /// Return the set of contacts that confirmed storing the value.
    pub fn stored_at(&self) -> Vec<&Contact> {
        self.closest
            .iter()
            .filter(|contact| self.stored_at.contains(contact.id()))
            .collect()
    }

    /// Returns `true` if nobody acknowledged the store.
    pub fn is_empty(&self) -> bool {
        self.stored_at.is_empty()
    }

    /// Return closest contacts. Useful to repeat the store operation without repeating the lookup.
    pub fn closest(&self) -> &[Contact] {
        &self.closest
    }
}
