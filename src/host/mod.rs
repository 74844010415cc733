//! Host application state.
//!
//! The synchronizer reads profile settings through [`HostStore::state`] and
//! reports changes through [`HostStore::dispatch`]. [`MemoryHostStore`] is an
//! in-process implementation used by the CLI and the tests.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{SaveId, SaveRecord};

/// Per-profile settings the synchronizer cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileState {
    pub id: String,
    pub name: String,
    pub game_id: String,
    /// Keep this profile's saves in their own `Saves\<profile>\` directory.
    pub local_saves: bool,
}

/// Snapshot of the host-side state tree.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    pub profiles: HashMap<String, ProfileState>,
    /// Local save path written for each profile, as stored in the game INI.
    pub save_paths: HashMap<String, String>,
    pub saves: HashMap<SaveId, SaveRecord>,
}

/// State changes reported to the host.
#[derive(Debug, Clone)]
pub enum HostEvent {
    SetSavePath { profile_id: String, path: String },
    ClearSaves,
    AddSaves(Vec<SaveRecord>),
}

/// Read/write access to the host application's state.
pub trait HostStore: Send + Sync {
    /// Current state snapshot.
    fn state(&self) -> HostState;

    /// Look up a single profile.
    fn profile(&self, profile_id: &str) -> Option<ProfileState> {
        self.state().profiles.get(profile_id).cloned()
    }

    fn dispatch(&self, event: HostEvent);
}

/// [`HostStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryHostStore {
    state: RwLock<HostState>,
}

impl MemoryHostStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profiles(profiles: impl IntoIterator<Item = ProfileState>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.write();
            for profile in profiles {
                state.profiles.insert(profile.id.clone(), profile);
            }
        }
        store
    }

    pub fn upsert_profile(&self, profile: ProfileState) {
        self.state.write().profiles.insert(profile.id.clone(), profile);
    }

    pub fn save_count(&self) -> usize {
        self.state.read().saves.len()
    }

    pub fn has_save(&self, id: &SaveId) -> bool {
        self.state.read().saves.contains_key(id)
    }

    pub fn save_path(&self, profile_id: &str) -> Option<String> {
        self.state.read().save_paths.get(profile_id).cloned()
    }
}

impl HostStore for MemoryHostStore {
    fn state(&self) -> HostState {
        self.state.read().clone()
    }

    fn profile(&self, profile_id: &str) -> Option<ProfileState> {
        self.state.read().profiles.get(profile_id).cloned()
    }

    fn dispatch(&self, event: HostEvent) {
        let mut state = self.state.write();
        match event {
            HostEvent::SetSavePath { profile_id, path } => {
                state.save_paths.insert(profile_id, path);
            }
            HostEvent::ClearSaves => state.saves.clear(),
            HostEvent::AddSaves(records) => {
                for record in records {
                    state.saves.entry(record.id.clone()).or_insert(record);
                }
            }
        }
    }
}
