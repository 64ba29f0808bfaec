//! Identity index over the run's pending objects.
//!
//! Maps (type, label-or-number) to either a parsed record awaiting creation
//! or a server invid cached by an earlier lookup, so each distinct
//! reference key is resolved remotely at most once per run.

use crate::error::ImportError;
use crate::types::{Invid, ObjNum, TypeId};
use std::collections::HashMap;

/// The in-document identity of an object record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Label(String),
    Num(ObjNum),
}

/// What an identity currently resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEntry {
    /// Index of a parsed record in the run's pending set.
    Record(usize),

    /// A server invid cached from a label lookup.
    Cached(Invid),
}

#[derive(Debug, Default)]
pub struct ObjectStore {
    entries: HashMap<(TypeId, IdentityKey), StoreEntry>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parsed record under its identity. Two records sharing an
    /// identity is a fatal error; a previously cached invid is displaced by
    /// the record (the record is the authoritative in-document definition).
    pub fn store_record(
        &mut self,
        type_id: TypeId,
        key: IdentityKey,
        index: usize,
        description: &str,
    ) -> Result<(), ImportError> {
        match self.entries.get(&(type_id, key.clone())) {
            Some(StoreEntry::Record(_)) => {
                Err(ImportError::DuplicateIdentity(description.to_string()))
            }
            _ => {
                self.entries.insert((type_id, key), StoreEntry::Record(index));
                Ok(())
            }
        }
    }

    /// Cache a server invid for an identity that has no in-document record.
    pub fn cache(&mut self, type_id: TypeId, key: IdentityKey, invid: Invid) {
        self.entries
            .entry((type_id, key))
            .or_insert(StoreEntry::Cached(invid));
    }

    pub fn lookup(&self, type_id: TypeId, key: &IdentityKey) -> Option<StoreEntry> {
        self.entries.get(&(type_id, key.clone())).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_record_identity_rejected() {
        let mut store = ObjectStore::new();
        store
            .store_record(1, IdentityKey::Label("alice".into()), 0, "<object alice>")
            .unwrap();
        let err = store
            .store_record(1, IdentityKey::Label("alice".into()), 1, "<object alice>")
            .unwrap_err();
        assert!(matches!(err, ImportError::DuplicateIdentity(_)));
    }

    #[test]
    fn test_same_label_different_types_coexist() {
        let mut store = ObjectStore::new();
        store
            .store_record(1, IdentityKey::Label("staff".into()), 0, "a")
            .unwrap();
        store
            .store_record(2, IdentityKey::Label("staff".into()), 1, "b")
            .unwrap();
        assert_eq!(
            store.lookup(2, &IdentityKey::Label("staff".into())),
            Some(StoreEntry::Record(1))
        );
    }

    #[test]
    fn test_cache_does_not_displace_record() {
        let mut store = ObjectStore::new();
        store
            .store_record(1, IdentityKey::Label("alice".into()), 3, "a")
            .unwrap();
        store.cache(1, IdentityKey::Label("alice".into()), Invid::new(1, 99));
        assert_eq!(
            store.lookup(1, &IdentityKey::Label("alice".into())),
            Some(StoreEntry::Record(3))
        );
    }

    #[test]
    fn test_record_displaces_cached_invid() {
        let mut store = ObjectStore::new();
        store.cache(1, IdentityKey::Num(7), Invid::new(1, 7));
        store
            .store_record(1, IdentityKey::Num(7), 0, "r")
            .unwrap();
        assert_eq!(
            store.lookup(1, &IdentityKey::Num(7)),
            Some(StoreEntry::Record(0))
        );
    }
}
