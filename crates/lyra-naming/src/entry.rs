use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use lyra_core::EntryId;

/// An identity-stable node in the file-name tree.
///
/// An entry binds a case-preserving spelling, an optional parent entry, and a
/// stable [`EntryId`] together. The registry that interned it holds only a
/// weak reference, so an entry stays alive exactly as long as some external
/// holder (or a live child, via the strong parent link) keeps it reachable.
///
/// The spelling is the only mutable field, and only case-preserving
/// respellings are permitted; see [`NameEntry::update_case`].
#[derive(Debug)]
pub struct NameEntry {
    parent: Option<Arc<NameEntry>>,
    id: EntryId,
    name: RwLock<String>,
}

impl NameEntry {
    /// Constructs an entry with an explicit identity.
    ///
    /// The registry is the usual caller and supplies a fresh or recycled id;
    /// constructing entries directly is mainly useful in tests. Root entries
    /// (no parent) store their full on-disk path as their name.
    pub fn new(parent: Option<Arc<NameEntry>>, name: impl Into<String>, id: EntryId) -> Self {
        Self {
            parent,
            id,
            name: RwLock::new(name.into()),
        }
    }

    /// The current case-preserving spelling.
    pub fn name(&self) -> String {
        self.read_name().clone()
    }

    /// The stable identity. Never changes, even across a case respelling.
    #[inline]
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn parent(&self) -> Option<&Arc<NameEntry>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Reconstructs the absolute location by walking the parent chain.
    ///
    /// Recomputed on every call rather than cached: path depth is bounded and
    /// this is called far less often than table lookups.
    pub fn to_path(&self) -> PathBuf {
        match &self.parent {
            Some(parent) => parent.to_path().join(self.read_name().as_str()),
            None => PathBuf::from(self.read_name().as_str()),
        }
    }

    /// Replaces the spelling in place with a case-only variant.
    ///
    /// The identity, parent, and bucket placement are unaffected. Feeding a
    /// structurally different name is a contract violation: it means the
    /// interning layer resolved this entry for a location it does not name.
    pub(crate) fn update_case(&self, new_spelling: &str) {
        let mut name = self
            .name
            .write()
            .unwrap_or_else(|err| err.into_inner());
        assert!(
            eq_ignore_case(&name, new_spelling),
            "case-only respelling changed the name structurally: {:?} -> {:?}",
            *name,
            new_spelling,
        );
        if *name != new_spelling {
            new_spelling.clone_into(&mut name);
        }
    }

    /// Structural comparison of spelling + parent chain.
    ///
    /// This is the cross-registry fallback: entries from different registries
    /// never share ids meaningfully, but they can still name the same
    /// location.
    pub fn same_location(&self, other: &NameEntry) -> bool {
        if *self.read_name() != *other.read_name() {
            return false;
        }
        match (&self.parent, &other.parent) {
            (Some(a), Some(b)) => a.same_location(b),
            (None, None) => true,
            _ => false,
        }
    }

    fn read_name(&self) -> RwLockReadGuard<'_, String> {
        // The spelling lock only ever guards a single `String` assignment, so
        // a poisoned lock cannot leave torn state behind.
        self.name.read().unwrap_or_else(|err| err.into_inner())
    }
}

impl PartialEq for NameEntry {
    fn eq(&self, other: &Self) -> bool {
        if self.id != other.id {
            return false;
        }
        // Ids are allocated, not computed, so a collision between entries
        // naming different locations means the allocator is broken.
        debug_assert!(
            self.same_location(other),
            "entries naming different locations share id {}",
            self.id,
        );
        true
    }
}

impl Eq for NameEntry {}

impl Hash for NameEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.id.to_raw());
    }
}

/// Case-insensitive string equality using Unicode simple lowercasing.
pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
