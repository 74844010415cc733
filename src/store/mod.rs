//! Authoritative set of known saves and the logic that merges scans into it.
//!
//! Every scan is started with a [`ScanTicket`]. Switching directories bumps
//! the generation, so results from a scan of the previous directory are
//! rejected instead of leaking into the new store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::host::{HostEvent, HostStore};
use crate::types::{DecodeFailure, SaveId, SaveRecord, ScanResult};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error(
        "Discarding scan of {directory} (generation {scan_generation}, current {current_generation})"
    )]
    StaleScan {
        directory: PathBuf,
        scan_generation: u64,
        current_generation: u64,
    },
}

/// Saves keyed by id.
#[derive(Debug, Default)]
pub struct SaveStore {
    records: HashMap<SaveId, SaveRecord>,
}

impl SaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless its id is already present.
    ///
    /// Returns `true` when the record was added.
    pub fn insert(&mut self, record: SaveRecord) -> bool {
        if self.records.contains_key(&record.id) {
            return false;
        }
        self.records.insert(record.id.clone(), record);
        true
    }

    pub fn contains(&self, id: &SaveId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &SaveId) -> Option<&SaveRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &SaveRecord> {
        self.records.values()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Identity of the directory a scan was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTicket {
    generation: u64,
    directory: PathBuf,
}

impl ScanTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Owns the [`SaveStore`] and mirrors its changes into the host.
pub struct SaveStoreSynchronizer {
    store: SaveStore,
    host: Arc<dyn HostStore>,
    generation: u64,
    directory: Option<PathBuf>,
    local_save_path: Option<String>,
}

impl SaveStoreSynchronizer {
    pub fn new(host: Arc<dyn HostStore>) -> Self {
        Self {
            store: SaveStore::new(),
            host,
            generation: 0,
            directory: None,
            local_save_path: None,
        }
    }

    /// Forget every known save and the configured paths.
    ///
    /// Scans started before the reset can no longer be applied.
    pub fn reset(&mut self) {
        self.store.clear();
        self.directory = None;
        self.local_save_path = None;
        self.generation += 1;
        self.host.dispatch(HostEvent::ClearSaves);
        crate::debug_event!("store", "reset", "generation {}", self.generation);
    }

    /// Reset and make `directory` the active save directory.
    pub fn activate_directory(&mut self, directory: PathBuf) -> ScanTicket {
        self.reset();
        self.directory = Some(directory.clone());
        ScanTicket {
            generation: self.generation,
            directory,
        }
    }

    /// Ticket for scanning the active directory, if there is one.
    pub fn current_ticket(&self) -> Option<ScanTicket> {
        self.directory.as_ref().map(|directory| ScanTicket {
            generation: self.generation,
            directory: directory.clone(),
        })
    }

    pub fn is_current(&self, ticket: &ScanTicket) -> bool {
        ticket.generation == self.generation
            && self.directory.as_deref() == Some(ticket.directory.as_path())
    }

    pub fn contains(&self, id: &SaveId) -> bool {
        self.store.contains(id)
    }

    pub fn store(&self) -> &SaveStore {
        &self.store
    }

    pub fn local_save_path(&self) -> Option<&str> {
        self.local_save_path.as_deref()
    }

    /// Record the local save path written for `profile_id`.
    pub fn set_local_save_path(&mut self, profile_id: &str, path: String) {
        self.local_save_path = Some(path.clone());
        self.host.dispatch(HostEvent::SetSavePath {
            profile_id: profile_id.to_string(),
            path,
        });
    }

    /// Merge the new records of a scan and hand back its failures.
    pub fn apply_scan(
        &mut self,
        ticket: &ScanTicket,
        result: ScanResult,
    ) -> Result<Vec<DecodeFailure>, StoreError> {
        if !self.is_current(ticket) {
            return Err(StoreError::StaleScan {
                directory: ticket.directory.clone(),
                scan_generation: ticket.generation,
                current_generation: self.generation,
            });
        }

        let added: Vec<SaveRecord> = result
            .new_records
            .into_iter()
            .filter(|record| self.store.insert(record.clone()))
            .collect();

        if !added.is_empty() {
            crate::log_event!("store", "added", "{} saves", added.len());
            self.host.dispatch(HostEvent::AddSaves(added));
        }

        Ok(result.failures)
    }
}
