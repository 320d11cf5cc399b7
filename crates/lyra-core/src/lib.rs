//! Core shared types for Lyra.
//!
//! This crate is intentionally small and dependency-free.

use std::fmt;

/// The stable integer identity of an interned name entry.
///
/// An id is assigned once, when the naming registry first sees a distinct
/// (parent, name) pair, and never changes for the lifetime of that entry,
/// not even across a case-only respelling. Ids of dropped entries may be
/// recycled for future entries, so an `EntryId` is only meaningful while the
/// entry it was read from is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u32);

impl EntryId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
