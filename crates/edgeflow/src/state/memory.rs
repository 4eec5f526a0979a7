use super::{StateMap, StateStore};
use crate::error::{EdgeflowError, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// In-memory state store for testing.
#[derive(Default)]
pub struct MemStateStore {
    state: Mutex<Option<StateMap>>,
    writes: AtomicUsize,
    simulate_write_error: AtomicBool,
}

impl MemStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `state`, as if left behind by a previous run.
    pub fn with_state(state: StateMap) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl StateStore for MemStateStore {
    fn get(&self) -> Result<Option<StateMap>> {
        Ok(self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, state: &StateMap) -> Result<()> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(EdgeflowError::Storage("Simulated write error".to_string()));
        }
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(state.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_state_roundtrip_and_clear() {
        let store = MemStateStore::new();
        assert_eq!(store.get().unwrap(), None);

        let mut state = StateMap::new();
        state.insert("k".to_string(), "v".to_string());
        store.set(&state).unwrap();
        assert_eq!(store.get().unwrap(), Some(state));
        assert_eq!(store.write_count(), 1);

        store.clear().unwrap();
        assert_eq!(store.get().unwrap(), None);
    }

    #[test]
    fn test_mem_state_simulated_error_keeps_old_state() {
        let mut state = StateMap::new();
        state.insert("a".to_string(), "1".to_string());
        let store = MemStateStore::with_state(state.clone());
        store.set_simulate_write_error(true);

        assert!(store.set(&StateMap::new()).is_err());
        assert_eq!(store.get().unwrap(), Some(state));
        assert_eq!(store.write_count(), 0);
    }
}
