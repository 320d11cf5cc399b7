use std::mem;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use lyra_core::EntryId;

use crate::entry::NameEntry;

/// The forward link of a [`NameSlot`].
///
/// The original design threads a free-list of recyclable ids through the same
/// nodes used for weak-reference bookkeeping: a chain node is either an
/// internal link or a terminal marker carrying the one id currently available
/// for reuse in that bucket. Modeled as an explicit sum type instead of a
/// duck-typed field.
#[derive(Debug)]
pub enum SlotNext {
    /// End of chain, no recyclable id at this position.
    End,
    /// Link to the next slot in the bucket chain.
    Link(Box<NameSlot>),
    /// Terminal marker: this slot is the last of its chain and carries the
    /// bucket's recyclable identity.
    FreeId(EntryId),
}

/// A weak-reference node in an intrusive singly-linked bucket chain.
///
/// One slot is created per interned [`NameEntry`]; the registry finds dead
/// entries and reclaims their integer identities by walking these chains
/// without ever holding the entries strongly.
///
/// Chains are owned data inside the registry's mutex, so every mutation is
/// linearized by construction. Slots built directly (e.g. in tests) are
/// single-owner values and need no locking at all.
#[derive(Debug)]
pub struct NameSlot {
    entry: Weak<NameEntry>,
    // Kept inline so the id stays recyclable after the weak reference dies.
    id: EntryId,
    next: SlotNext,
}

impl NameSlot {
    pub fn new(entry: &Arc<NameEntry>) -> Self {
        Self {
            entry: Arc::downgrade(entry),
            id: entry.id(),
            next: SlotNext::End,
        }
    }

    /// The id of the entry this slot was created for. Unlike the weak
    /// reference, this survives the entry being dropped.
    #[inline]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Dereferences the weak reference. `None` after the entry was dropped,
    /// which callers treat as the normal "no longer live" case.
    pub fn upgrade(&self) -> Option<Arc<NameEntry>> {
        self.entry.upgrade()
    }

    /// The referent's reconstructed location, if it is still live.
    pub fn file(&self) -> Option<PathBuf> {
        self.upgrade().map(|entry| entry.to_path())
    }

    pub fn is_live(&self) -> bool {
        self.entry.strong_count() > 0
    }

    /// The next chain node, or `None` if this node terminates the chain
    /// (with or without a free-id marker).
    pub fn next(&self) -> Option<&NameSlot> {
        match &self.next {
            SlotNext::Link(slot) => Some(slot),
            SlotNext::End | SlotNext::FreeId(_) => None,
        }
    }

    /// Walks forward to the chain's free-id marker.
    ///
    /// Returns `None` when no identity is currently reclaimable from this
    /// position.
    pub fn get_index(&self) -> Option<EntryId> {
        let mut cursor = self;
        loop {
            match &cursor.next {
                SlotNext::FreeId(id) => return Some(*id),
                SlotNext::Link(rest) => cursor = rest,
                SlotNext::End => return None,
            }
        }
    }

    /// One-shot initializer linking this slot in front of `rest`.
    ///
    /// Chain topology is built once; re-linking an initialized node is a
    /// contract violation.
    pub fn set_next(&mut self, rest: Box<NameSlot>) {
        assert!(
            matches!(self.next, SlotNext::End),
            "slot already linked; chains are only restructured through remove/skip",
        );
        self.next = SlotNext::Link(rest);
    }

    /// One-shot initializer marking this slot as the chain terminal carrying
    /// a recyclable id.
    pub fn set_index(&mut self, id: EntryId) {
        assert!(
            matches!(self.next, SlotNext::End),
            "slot already linked; chains are only restructured through remove/skip",
        );
        self.next = SlotNext::FreeId(id);
    }

    /// Unlinks the slot with id `target` from the chain starting at `self`.
    ///
    /// Returns the possibly-new head, or `None` when the chain is now empty.
    /// A target absent from the chain is tolerated: the chain is returned
    /// unchanged. When the removed slot carried the free-id marker, its
    /// predecessor inherits it; a sole slot has no predecessor, so its marker
    /// is pushed onto `freed` for the caller to re-home.
    pub fn remove(
        self: Box<Self>,
        target: EntryId,
        freed: &mut Vec<EntryId>,
    ) -> Option<Box<NameSlot>> {
        let mut head = self;
        if head.id == target {
            return match head.next {
                SlotNext::Link(rest) => Some(rest),
                SlotNext::FreeId(orphan) => {
                    freed.push(orphan);
                    None
                }
                SlotNext::End => None,
            };
        }
        head.unlink(target);
        Some(head)
    }

    fn unlink(&mut self, target: EntryId) {
        let found = matches!(&self.next, SlotNext::Link(rest) if rest.id == target);
        if found {
            if let SlotNext::Link(dead) = mem::replace(&mut self.next, SlotNext::End) {
                // Inherit the successor link or free-id marker.
                self.next = dead.next;
            }
            return;
        }
        if let SlotNext::Link(rest) = &mut self.next {
            rest.unlink(target);
        }
    }

    /// Splices out the immediate successor, whose referent the caller has
    /// already confirmed dead, in O(1). Returns its id for recycling.
    ///
    /// Calling this on a slot with no successor is a contract violation.
    pub fn skip_next(&mut self) -> EntryId {
        match mem::replace(&mut self.next, SlotNext::End) {
            SlotNext::Link(dead) => {
                debug_assert!(!dead.is_live(), "skipped a slot with a live referent");
                let id = dead.id;
                self.next = dead.next;
                id
            }
            other => {
                self.next = other;
                panic!("skip_next called on a slot with no successor");
            }
        }
    }

    /// Destructively drains the whole chain from `self` onward.
    ///
    /// Every `next` link is severed; the slots whose referent is still alive
    /// are returned (ready to be re-inserted into a rebuilt chain), the dead
    /// ones are dropped along with any free-id marker.
    pub fn disconnect_all(self: Box<Self>) -> Vec<Box<NameSlot>> {
        let mut live = Vec::new();
        let mut cursor = Some(self);
        while let Some(mut slot) = cursor {
            cursor = match mem::replace(&mut slot.next, SlotNext::End) {
                SlotNext::Link(rest) => Some(rest),
                SlotNext::End | SlotNext::FreeId(_) => None,
            };
            if slot.is_live() {
                live.push(slot);
            }
        }
        live
    }

    /// Rebuilds the chain without its dead slots or free-id marker.
    ///
    /// Ids recyclable after the pass (dead slot ids plus the stripped marker,
    /// if any) are pushed onto `freed`; the caller decides where to re-thread
    /// them. Returns `None` when no live slot remains.
    pub(crate) fn compact(
        mut self: Box<Self>,
        freed: &mut Vec<EntryId>,
    ) -> Option<Box<NameSlot>> {
        let rest = match mem::replace(&mut self.next, SlotNext::End) {
            SlotNext::Link(rest) => rest.compact(freed),
            SlotNext::FreeId(id) => {
                freed.push(id);
                None
            }
            SlotNext::End => None,
        };
        if self.is_live() {
            if let Some(rest) = rest {
                self.set_next(rest);
            }
            Some(self)
        } else {
            freed.push(self.id);
            rest
        }
    }

    /// Threads `id` onto the chain terminal as its free-id marker.
    ///
    /// Returns `false` when the chain already carries one; a chain stores at
    /// most a single recyclable id.
    pub(crate) fn push_free_id(&mut self, id: EntryId) -> bool {
        match &mut self.next {
            SlotNext::Link(rest) => rest.push_free_id(id),
            SlotNext::FreeId(_) => false,
            SlotNext::End => {
                self.next = SlotNext::FreeId(id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, id: u32) -> Arc<NameEntry> {
        Arc::new(NameEntry::new(None, name, EntryId::from_raw(id)))
    }

    /// Builds `head -> slots[0] -> slots[1] -> ...` with an optional terminal
    /// free id, returning the head.
    fn chain(entries: &[Arc<NameEntry>], free_id: Option<u32>) -> Box<NameSlot> {
        let mut head: Option<Box<NameSlot>> = None;
        for e in entries.iter().rev() {
            let mut slot = Box::new(NameSlot::new(e));
            match head.take() {
                Some(rest) => slot.set_next(rest),
                None => {
                    if let Some(k) = free_id {
                        slot.set_index(EntryId::from_raw(k));
                    }
                }
            }
            head = Some(slot);
        }
        head.expect("chain built from at least one entry")
    }

    #[test]
    fn get_index_is_visible_from_every_node() {
        let entries: Vec<_> = (0..4).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, Some(99));

        let mut cursor = Some(&*head);
        while let Some(slot) = cursor {
            assert_eq!(slot.get_index(), Some(EntryId::from_raw(99)));
            cursor = slot.next();
        }
    }

    #[test]
    fn get_index_without_marker_is_none() {
        let entries: Vec<_> = (0..2).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, None);
        assert_eq!(head.get_index(), None);
    }

    #[test]
    fn remove_keeps_the_marker_on_the_terminal_node() {
        let entries: Vec<_> = (0..3).map(|i| entry(&format!("e{i}"), i)).collect();
        let mut head = chain(&entries, Some(7));

        // Remove everything down to the terminal slot.
        let mut freed = Vec::new();
        head = head
            .remove(EntryId::from_raw(0), &mut freed)
            .expect("chain not empty");
        head = head
            .remove(EntryId::from_raw(1), &mut freed)
            .expect("chain not empty");
        assert!(freed.is_empty());

        assert_eq!(head.id(), EntryId::from_raw(2));
        assert!(head.next().is_none());
        assert_eq!(head.get_index(), Some(EntryId::from_raw(7)));
    }

    #[test]
    fn remove_of_a_middle_node_relinks_the_chain() {
        let entries: Vec<_> = (0..3).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, None);

        let head = head
            .remove(EntryId::from_raw(1), &mut Vec::new())
            .expect("chain not empty");
        assert_eq!(head.id(), EntryId::from_raw(0));
        assert_eq!(head.next().map(NameSlot::id), Some(EntryId::from_raw(2)));
        assert!(head.next().unwrap().next().is_none());
    }

    #[test]
    fn remove_inherits_the_marker_from_the_removed_terminal() {
        let entries: Vec<_> = (0..2).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, Some(5));

        let head = head
            .remove(EntryId::from_raw(1), &mut Vec::new())
            .expect("chain not empty");
        assert_eq!(head.id(), EntryId::from_raw(0));
        assert_eq!(head.get_index(), Some(EntryId::from_raw(5)));
    }

    #[test]
    fn remove_of_an_absent_target_leaves_the_chain_unchanged() {
        let entries: Vec<_> = (0..3).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, Some(7));

        let head = head
            .remove(EntryId::from_raw(42), &mut Vec::new())
            .expect("chain not empty");
        let ids: Vec<_> = {
            let mut out = Vec::new();
            let mut cursor = Some(&*head);
            while let Some(slot) = cursor {
                out.push(slot.id().to_raw());
                cursor = slot.next();
            }
            out
        };
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(head.get_index(), Some(EntryId::from_raw(7)));
    }

    #[test]
    fn remove_of_the_sole_slot_empties_the_chain() {
        let e = entry("only", 0);
        let head = Box::new(NameSlot::new(&e));
        assert!(head.remove(EntryId::from_raw(0), &mut Vec::new()).is_none());
    }

    #[test]
    fn remove_of_the_sole_slot_surrenders_its_marker() {
        let e = entry("only", 0);
        let mut head = Box::new(NameSlot::new(&e));
        head.set_index(EntryId::from_raw(11));

        let mut freed = Vec::new();
        assert!(head.remove(EntryId::from_raw(0), &mut freed).is_none());
        assert_eq!(freed, vec![EntryId::from_raw(11)]);
    }

    #[test]
    fn skip_next_splices_a_dead_slot_and_returns_its_id() {
        let live = entry("live", 0);
        let dead = entry("dead", 1);
        let tail = entry("tail", 2);

        let mut tail_slot = Box::new(NameSlot::new(&tail));
        tail_slot.set_index(EntryId::from_raw(9));
        let mut dead_slot = Box::new(NameSlot::new(&dead));
        dead_slot.set_next(tail_slot);
        let mut head = Box::new(NameSlot::new(&live));
        head.set_next(dead_slot);

        drop(dead);
        assert_eq!(head.skip_next(), EntryId::from_raw(1));
        assert_eq!(head.next().map(NameSlot::id), Some(EntryId::from_raw(2)));
        assert_eq!(head.get_index(), Some(EntryId::from_raw(9)));
    }

    #[test]
    fn skip_next_over_a_dead_terminal_inherits_its_marker() {
        let live = entry("live", 0);
        let dead = entry("dead", 1);

        let mut dead_slot = Box::new(NameSlot::new(&dead));
        dead_slot.set_index(EntryId::from_raw(4));
        let mut head = Box::new(NameSlot::new(&live));
        head.set_next(dead_slot);

        drop(dead);
        assert_eq!(head.skip_next(), EntryId::from_raw(1));
        assert_eq!(head.get_index(), Some(EntryId::from_raw(4)));
    }

    #[test]
    #[should_panic(expected = "no successor")]
    fn skip_next_without_a_successor_panics() {
        let e = entry("only", 0);
        let mut head = Box::new(NameSlot::new(&e));
        head.skip_next();
    }

    #[test]
    fn disconnect_all_returns_exactly_the_live_subset() {
        let entries: Vec<_> = (0..5).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, Some(11));

        // Keep entries 1 and 3 strongly reachable, drop the rest.
        let keep: Vec<_> = [1usize, 3].iter().map(|&i| entries[i].clone()).collect();
        drop(entries);

        let live = head.disconnect_all();
        let mut ids: Vec<_> = live.iter().map(|s| s.id().to_raw()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);

        // Every surviving slot had its forward link severed.
        for slot in &live {
            assert!(slot.next().is_none());
            assert_eq!(slot.get_index(), None);
        }
        drop(keep);
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn set_next_twice_is_a_contract_violation() {
        let a = entry("a", 0);
        let b = entry("b", 1);
        let mut head = Box::new(NameSlot::new(&a));
        head.set_next(Box::new(NameSlot::new(&b)));
        let c = entry("c", 2);
        head.set_next(Box::new(NameSlot::new(&c)));
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn set_index_after_set_next_is_a_contract_violation() {
        let a = entry("a", 0);
        let b = entry("b", 1);
        let mut head = Box::new(NameSlot::new(&a));
        head.set_next(Box::new(NameSlot::new(&b)));
        head.set_index(EntryId::from_raw(3));
    }

    #[test]
    fn compact_drops_dead_slots_and_collects_their_ids() {
        let entries: Vec<_> = (0..4).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, Some(20));

        // Drop entries 0 and 2; keep 1 and 3 live.
        let keep: Vec<_> = [1usize, 3].iter().map(|&i| entries[i].clone()).collect();
        drop(entries);

        let mut freed = Vec::new();
        let head = head.compact(&mut freed).expect("live slots remain");

        let ids: Vec<_> = {
            let mut out = Vec::new();
            let mut cursor = Some(&*head);
            while let Some(slot) = cursor {
                out.push(slot.id().to_raw());
                cursor = slot.next();
            }
            out
        };
        assert_eq!(ids, vec![1, 3]);
        // Marker stripped; dead ids plus the old marker are recyclable.
        assert_eq!(head.get_index(), None);
        freed.sort_unstable_by_key(|id| id.to_raw());
        assert_eq!(
            freed,
            vec![
                EntryId::from_raw(0),
                EntryId::from_raw(2),
                EntryId::from_raw(20)
            ]
        );
        drop(keep);
    }

    #[test]
    fn compact_of_a_fully_dead_chain_yields_nothing() {
        let entries: Vec<_> = (0..2).map(|i| entry(&format!("e{i}"), i)).collect();
        let head = chain(&entries, None);
        drop(entries);

        let mut freed = Vec::new();
        assert!(head.compact(&mut freed).is_none());
        assert_eq!(freed.len(), 2);
    }

    #[test]
    fn push_free_id_threads_at_most_one_marker() {
        let entries: Vec<_> = (0..2).map(|i| entry(&format!("e{i}"), i)).collect();
        let mut head = chain(&entries, None);

        assert!(head.push_free_id(EntryId::from_raw(8)));
        assert_eq!(head.get_index(), Some(EntryId::from_raw(8)));
        assert!(!head.push_free_id(EntryId::from_raw(9)));
        assert_eq!(head.get_index(), Some(EntryId::from_raw(8)));
    }

    #[test]
    fn file_delegates_to_a_live_referent_and_is_none_after_drop() {
        let e = entry("/tmp/x", 0);
        let slot = NameSlot::new(&e);
        assert_eq!(slot.file(), Some(PathBuf::from("/tmp/x")));

        drop(e);
        assert!(!slot.is_live());
        assert_eq!(slot.file(), None);
        assert!(slot.upgrade().is_none());
    }
}
