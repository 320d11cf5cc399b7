use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use lyra_core::EntryId;

use crate::entry::{eq_ignore_case, NameEntry};
use crate::listing::ListingCache;
use crate::rename::{perform_move, RenameHandler, Result};
use crate::slot::NameSlot;

/// Configuration for a [`NameRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConfig {
    /// Whether lookups distinguish names that differ only by case.
    ///
    /// With `false`, interning a different spelling of an existing name
    /// returns the existing entry after refreshing its spelling in place.
    pub case_sensitive: bool,
    /// Number of directory listings the registry caches.
    pub listing_capacity: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            case_sensitive: cfg!(not(windows)),
            listing_capacity: ListingCache::DEFAULT_CAPACITY,
        }
    }
}

/// Point-in-time registry counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Interned entries whose weak slot still resolves.
    pub live_entries: usize,
    /// Occupied hash buckets (live or not yet compacted).
    pub buckets: usize,
    /// Recyclable ids parked on the registry-level free list.
    pub free_ids: usize,
    /// High-water mark of the bump allocator.
    pub next_id: u32,
}

/// Result summary from a [`NameRegistry::sweep`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub buckets_scanned: usize,
    /// Dead slots spliced out of their chains.
    pub slots_removed: usize,
    /// Ids made available for reuse (dead slot ids plus re-threaded markers).
    pub ids_recycled: usize,
    /// Live slots remaining after the pass.
    pub live_slots: usize,
}

/// The canonical name-interning registry.
///
/// Hands out at most one live [`NameEntry`] per distinct (parent, name) pair.
/// The registry holds only weak references, so unused entries stay
/// collectible even in a long-running process watching a large tree; their
/// integer identities are reclaimed by the compaction pass that runs inline
/// on every interning miss and on demand via [`sweep`](Self::sweep).
///
/// One coarse mutex covers the whole bucket table. Chain operations are
/// O(bucket length) and buckets are expected to stay short; correctness of
/// the id free-list matters far more than lookup throughput here.
#[derive(Debug)]
pub struct NameRegistry {
    inner: Mutex<RegistryInner>,
    listings: ListingCache,
    config: NamingConfig,
}

#[derive(Debug)]
struct RegistryInner {
    buckets: HashMap<u64, Box<NameSlot>>,
    /// Ids orphaned when a bucket emptied with no live slot left to carry
    /// them. Reuse order is arbitrary.
    free_ids: Vec<EntryId>,
    next_id: u32,
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::with_config(NamingConfig::default())
    }

    pub fn with_config(config: NamingConfig) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                buckets: HashMap::new(),
                free_ids: Vec::new(),
                next_id: 0,
            }),
            listings: ListingCache::new(config.listing_capacity),
            config,
        }
    }

    pub fn config(&self) -> &NamingConfig {
        &self.config
    }

    /// The directory-listing cache invalidated by [`rename`](Self::rename).
    pub fn listings(&self) -> &ListingCache {
        &self.listings
    }

    /// Interns a root entry whose name is its full on-disk path.
    pub fn root(&self, path: impl Into<String>) -> Arc<NameEntry> {
        let path = path.into();
        self.intern(None, &path)
    }

    /// Returns the canonical entry for (`parent`, `name`), creating one on a
    /// miss.
    ///
    /// The bucket is compacted on the way in: dead slots are spliced out and
    /// their ids recycled, standing in for the reference-queue drain a
    /// garbage-collected runtime would provide. New ids prefer the bucket's
    /// own recyclable id, then the registry free list, then the bump counter.
    pub fn intern(&self, parent: Option<&Arc<NameEntry>>, name: &str) -> Arc<NameEntry> {
        let key = bucket_key(parent, name);
        let mut inner = self.lock_inner();

        let mut freed = Vec::new();
        let chain = match inner.buckets.remove(&key) {
            Some(head) => head.compact(&mut freed),
            None => None,
        };

        let mut existing = None;
        let mut cursor = chain.as_deref();
        while let Some(slot) = cursor {
            if let Some(entry) = slot.upgrade() {
                if same_parent(entry.parent(), parent) {
                    let current = entry.name();
                    if current == name {
                        existing = Some(entry);
                        break;
                    }
                    if !self.config.case_sensitive && eq_ignore_case(&current, name) {
                        // The disk reported a new spelling of a known name.
                        entry.update_case(name);
                        existing = Some(entry);
                        break;
                    }
                }
            }
            cursor = slot.next();
        }

        if let Some(entry) = existing {
            if let Some(chain) = chain {
                Self::reinstall(&mut inner, key, chain, freed);
            }
            return entry;
        }

        let id = freed
            .pop()
            .or_else(|| inner.free_ids.pop())
            .unwrap_or_else(|| {
                let raw = inner.next_id;
                inner.next_id = raw
                    .checked_add(1)
                    .expect("too many name entries allocated");
                EntryId::from_raw(raw)
            });

        let entry = Arc::new(NameEntry::new(parent.cloned(), name, id));
        let mut head = Box::new(NameSlot::new(&entry));
        if let Some(rest) = chain {
            head.set_next(rest);
        }
        Self::reinstall(&mut inner, key, head, freed);

        tracing::trace!(
            target = "lyra.naming",
            id = %entry.id(),
            name,
            "interned name entry"
        );
        entry
    }

    /// Lookup without creation.
    pub fn get(&self, parent: Option<&Arc<NameEntry>>, name: &str) -> Option<Arc<NameEntry>> {
        let key = bucket_key(parent, name);
        let inner = self.lock_inner();
        let mut cursor = inner.buckets.get(&key).map(|head| &**head);
        while let Some(slot) = cursor {
            if let Some(entry) = slot.upgrade() {
                if same_parent(entry.parent(), parent) {
                    let current = entry.name();
                    if current == name
                        || (!self.config.case_sensitive && eq_ignore_case(&current, name))
                    {
                        return Some(entry);
                    }
                }
            }
            cursor = slot.next();
        }
        None
    }

    /// Case-only respelling of an interned entry.
    ///
    /// Identity and bucket placement are unchanged; buckets hash the
    /// case-folded name precisely so this never migrates an entry.
    pub fn update_case(&self, entry: &Arc<NameEntry>, new_spelling: &str) {
        entry.update_case(new_spelling);
    }

    /// Renames the disk entity behind `entry` and returns the entry for the
    /// new location.
    ///
    /// - If the backing path no longer exists, the original entry is returned
    ///   unchanged; no identity is minted and no error raised.
    /// - In a case-insensitive registry a case-only respelling moves the disk
    ///   entity but keeps the entry and its identity, refreshing the spelling
    ///   in place. A case-sensitive registry treats it as an ordinary rename.
    /// - Otherwise the move runs through `handler` (or [`std::fs::rename`]),
    ///   listing caches for the old location are invalidated, and a freshly
    ///   interned entry is returned. Whether its id is new or recycled is the
    ///   interning layer's business.
    ///
    /// I/O failures from the underlying move propagate unchanged.
    pub fn rename(
        &self,
        entry: &Arc<NameEntry>,
        new_name: &str,
        handler: Option<&dyn RenameHandler>,
    ) -> Result<Arc<NameEntry>> {
        let from = entry.to_path();
        if !from.exists() {
            tracing::debug!(
                target = "lyra.naming",
                from = %from.display(),
                "rename source vanished; keeping existing entry"
            );
            return Ok(entry.clone());
        }

        let current = entry.name();
        if current == new_name {
            return Ok(entry.clone());
        }

        let to = match entry.parent() {
            Some(parent) => parent.to_path().join(new_name),
            None => PathBuf::from(new_name),
        };

        if !self.config.case_sensitive && eq_ignore_case(&current, new_name) {
            // Same disk entity under a new spelling: move without the
            // destination-collision guard (on a case-insensitive file system
            // the destination *is* the source) and keep the identity. A
            // case-sensitive registry never takes this path; there the two
            // spellings are distinct entries and distinct disk entities.
            match handler {
                Some(handler) => handler.handle(&from, &to)?,
                None => std::fs::rename(&from, &to)?,
            }
            self.invalidate_listings(entry, &from);
            entry.update_case(new_name);
            tracing::debug!(
                target = "lyra.naming",
                from = %from.display(),
                to = %to.display(),
                id = %entry.id(),
                "case-only rename"
            );
            return Ok(entry.clone());
        }

        perform_move(&from, &to, handler)?;
        self.invalidate_listings(entry, &from);
        tracing::debug!(
            target = "lyra.naming",
            from = %from.display(),
            to = %to.display(),
            "renamed"
        );
        Ok(self.intern(entry.parent(), new_name))
    }

    /// Full check-and-compact pass over every bucket.
    pub fn sweep(&self) -> SweepReport {
        let mut inner = self.lock_inner();
        let keys: Vec<u64> = inner.buckets.keys().copied().collect();

        let mut report = SweepReport {
            buckets_scanned: keys.len(),
            slots_removed: 0,
            ids_recycled: 0,
            live_slots: 0,
        };

        for key in keys {
            let Some(head) = inner.buckets.remove(&key) else {
                continue;
            };
            let before = chain_len(&head);
            let mut freed = Vec::new();
            match head.compact(&mut freed) {
                Some(head) => {
                    let after = chain_len(&head);
                    report.slots_removed += before - after;
                    report.live_slots += after;
                    report.ids_recycled += freed.len();
                    Self::reinstall(&mut inner, key, head, freed);
                }
                None => {
                    report.slots_removed += before;
                    report.ids_recycled += freed.len();
                    inner.free_ids.append(&mut freed);
                }
            }
        }

        tracing::debug!(
            target = "lyra.naming",
            buckets = report.buckets_scanned,
            removed = report.slots_removed,
            recycled = report.ids_recycled,
            live = report.live_slots,
            "sweep finished"
        );
        report
    }

    /// Tears the table down, severing every chain.
    ///
    /// Returns the number of entries that were still live; those entries keep
    /// working on their own, the registry just no longer knows them.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock_inner();
        let mut live = 0;
        let buckets: Vec<Box<NameSlot>> = inner.buckets.drain().map(|(_, head)| head).collect();
        for head in buckets {
            live += head.disconnect_all().len();
        }
        inner.free_ids.clear();
        live
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.lock_inner();
        let mut live = 0;
        for head in inner.buckets.values() {
            let mut cursor = Some(&**head);
            while let Some(slot) = cursor {
                if slot.is_live() {
                    live += 1;
                }
                cursor = slot.next();
            }
        }
        RegistryStats {
            live_entries: live,
            buckets: inner.buckets.len(),
            free_ids: inner.free_ids.len(),
            next_id: inner.next_id,
        }
    }

    /// Number of live slots in the bucket for (`parent`, `name`).
    ///
    /// Mainly useful for tests asserting interning behavior.
    pub fn bucket_live_slots(&self, parent: Option<&Arc<NameEntry>>, name: &str) -> usize {
        let key = bucket_key(parent, name);
        let inner = self.lock_inner();
        let mut live = 0;
        let mut cursor = inner.buckets.get(&key).map(|head| &**head);
        while let Some(slot) = cursor {
            if slot.is_live() {
                live += 1;
            }
            cursor = slot.next();
        }
        live
    }

    /// Puts a compacted chain back into the table, re-threading at most one
    /// recyclable id through its terminal and parking the rest on the
    /// registry free list.
    fn reinstall(
        inner: &mut RegistryInner,
        key: u64,
        mut head: Box<NameSlot>,
        mut freed: Vec<EntryId>,
    ) {
        while let Some(spare) = freed.pop() {
            if !head.push_free_id(spare) {
                inner.free_ids.push(spare);
            }
        }
        inner.buckets.insert(key, head);
    }

    fn invalidate_listings(&self, entry: &Arc<NameEntry>, from: &std::path::Path) {
        self.listings.invalidate(from);
        if let Some(parent) = entry.parent() {
            self.listings.invalidate(&parent.to_path());
        }
    }

    #[track_caller]
    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = std::panic::Location::caller();
                tracing::error!(
                    target = "lyra.naming",
                    file = loc.file(),
                    line = loc.line(),
                    error = %err,
                    "mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }
}

/// Buckets hash the parent identity and the case-folded name, so a case-only
/// respelling never moves an entry between buckets.
fn bucket_key(parent: Option<&Arc<NameEntry>>, name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    parent.map(|parent| parent.id().to_raw()).hash(&mut hasher);
    for ch in name.chars().flat_map(char::to_lowercase) {
        ch.hash(&mut hasher);
    }
    hasher.finish()
}

fn same_parent(candidate: Option<&Arc<NameEntry>>, parent: Option<&Arc<NameEntry>>) -> bool {
    match (candidate, parent) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

fn chain_len(head: &NameSlot) -> usize {
    let mut len = 0;
    let mut cursor = Some(head);
    while let Some(slot) = cursor {
        len += 1;
        cursor = slot.next();
    }
    len
}
