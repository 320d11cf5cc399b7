//! Canonical file-name interning for Lyra.
//!
//! The naming layer is responsible for:
//! - Handing out at most one live [`NameEntry`] per distinct (parent, name)
//!   pair, with a stable [`EntryId`] usable as a compact identity key.
//! - Holding only weak references to what it interned, so unused entries stay
//!   collectible in a long-running process watching a large tree.
//! - Recycling the integer identities of dropped entries through the
//!   [`NameSlot`] bucket chains.
//! - Disk renames (direct or through a caller-supplied [`RenameHandler`]) and
//!   the directory-listing cache invalidation they imply.

mod entry;
mod listing;
mod registry;
mod rename;
mod slot;

pub use entry::NameEntry;
pub use listing::ListingCache;
pub use lyra_core::EntryId;
pub use registry::{NameRegistry, NamingConfig, RegistryStats, SweepReport};
pub use rename::{NamingError, RenameHandler, Result};
pub use slot::{NameSlot, SlotNext};
