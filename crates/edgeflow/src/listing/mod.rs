//! # Incremental Directory Listing
//!
//! A listing pass walks a directory and emits one flow file per file it has
//! not emitted before. "Before" survives restarts: the pass persists what it
//! has seen through a [`StateStore`](crate::state::StateStore).
//!
//! ## One Pass
//!
//! 1. Load the persisted state once ([`ListingStateManager::get_current_state`]).
//!    If it was written under other settings (strategy, host, user, path) it
//!    is discarded with a warning and everything is listed again.
//! 2. Walk the directory, deciding for every file: already listed, filtered
//!    out, or new.
//! 3. Transfer the new files and fold them into the state.
//! 4. Store the whole state once. A crash between 3 and 4 re-lists on the
//!    next start (at-least-once).
//! 5. Yield if nothing was listed.
//!
//! ## Strategies
//!
//! - **Tracking Timestamps**: a file is new only if it is strictly newer than
//!   the newest listed timestamp. A tie counts as already listed.
//! - **Tracking Entities**: every path is remembered with size and
//!   timestamp; a size change is new content even at the same timestamp.

pub mod entity;
pub mod filter;
pub mod list_file;
pub mod manager;
pub mod state;
pub mod walker;

pub use entity::ListedEntity;
pub use filter::FileFilter;
pub use list_file::{ListFile, ListingReport};
pub use manager::{ListingSettings, ListingStateManager};
pub use state::{ListingState, ListingStrategy};
