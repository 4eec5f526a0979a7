//! # Persisted Component State
//!
//! Processors persist their incremental progress (what was listed, how far a
//! file was tailed) as a flat string-keyed map. This module only moves such
//! maps in and out of storage; the meaning of the keys belongs to the
//! component that writes them.
//!
//! - [`memory::MemStateStore`]: in-memory, for tests. Supports write-error
//!   simulation.
//! - [`file::FileStateStore`]: one JSON document per component, replaced
//!   atomically on every save.

use crate::error::Result;
use std::collections::HashMap;

pub mod file;
pub mod memory;

pub use file::FileStateStore;
pub use memory::MemStateStore;

/// Flat persisted state of one component.
pub type StateMap = HashMap<String, String>;

/// Key-value state-manager interface used by the listing and tailing passes.
pub trait StateStore: Send + Sync {
    /// The last stored map, or `None` if nothing was ever stored.
    fn get(&self) -> Result<Option<StateMap>>;

    /// Replace the stored map as a whole.
    fn set(&self, state: &StateMap) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

impl<S: StateStore + ?Sized> StateStore for Box<S> {
    fn get(&self) -> Result<Option<StateMap>> {
        (**self).get()
    }

    fn set(&self, state: &StateMap) -> Result<()> {
        (**self).set(state)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn get(&self) -> Result<Option<StateMap>> {
        (**self).get()
    }

    fn set(&self, state: &StateMap) -> Result<()> {
        (**self).set(state)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}
