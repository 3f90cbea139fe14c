//! In-memory session store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use trucktech_browser::{BrowserError, Result, SessionState, SessionStore};

#[derive(Debug, Default)]
struct Slots {
    states: HashMap<PathBuf, SessionState>,
    load_error: Option<String>,
    saves: usize,
}

/// A [`SessionStore`] keeping states in memory. Clones share contents.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    slots: Arc<Mutex<Slots>>,
}

impl MemorySessionStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `state` at `path`.
    pub fn with_state(path: impl Into<PathBuf>, state: SessionState) -> Self {
        let store = Self::new();
        store.slots().states.insert(path.into(), state);
        store
    }

    /// Make every load fail as a corrupt file would.
    #[must_use]
    pub fn failing_loads(self, message: &str) -> Self {
        self.slots().load_error = Some(message.to_string());
        self
    }

    /// State stored at `path`, if any.
    pub fn get(&self, path: &Path) -> Option<SessionState> {
        self.slots().states.get(path).cloned()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.slots().saves
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, path: &Path) -> Result<Option<SessionState>> {
        let slots = self.slots();
        if let Some(message) = &slots.load_error {
            return Err(BrowserError::Session(message.clone()));
        }
        Ok(slots.states.get(path).filter(|s| !s.is_empty()).cloned())
    }

    async fn save(&self, path: &Path, state: &SessionState) -> Result<()> {
        let mut slots = self.slots();
        slots.states.insert(path.to_path_buf(), state.clone());
        slots.saves += 1;
        Ok(())
    }
}
