//! Profile-driven save synchronization.
//!
//! ```text
//! Idle -> Configuring -> ScanningInitial -> Watching
//!   ^                                         |
//!   +------------- teardown() ----------------+
//! ```
//!
//! Activating a profile rewrites the game's save path, clears the store,
//! scans the effective save directory and binds a watch to it. Watch events
//! go through a [`DebouncedTrigger`] into repeat scans that only ever add
//! records.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::decoder::SaveDecoder;
use crate::games::{GameSupport, GameTable, default_my_games_root};
use crate::host::{HostStore, ProfileState};
use crate::ini;
use crate::notifications::{NotificationBroadcaster, UserNotification};
use crate::scanner::{RetryPolicy, SaveScanner, ScanError};
use crate::store::{SaveStoreSynchronizer, ScanTicket};
use crate::types::{DecodeFailure, SaveId};
use crate::watcher::{DebouncedTrigger, DirectoryWatchController};

const DECODE_FAILURE_TITLE: &str = "Failed to read savegames";
const WATCH_FAILURE_TITLE: &str = "Can't watch savegame directory";
const CONFIG_FAILURE_TITLE: &str = "Failed to update savegame path";

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{reason} is required")]
    MissingComponent { reason: String },

    #[error("No \"My Games\" directory configured and no documents directory found")]
    NoMyGamesRoot,
}

/// Where the synchronizer currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Configuring,
    ScanningInitial,
    /// Store populated and a live watch is bound.
    Watching,
    /// Store populated, but the directory could not be watched.
    Unwatched,
}

/// Outcome of [`SaveSyncService::activate_profile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Unknown profile id; nothing changed.
    Cancelled,
    /// The profile's game has no savegame support.
    Unsupported { game_id: String },
    Watching { directory: PathBuf },
    /// Scanned, but live updates are unavailable.
    Unwatched { directory: PathBuf },
}

struct Shared {
    synchronizer: parking_lot::Mutex<SaveStoreSynchronizer>,
    /// Serializes scan passes.
    scan_gate: tokio::sync::Mutex<()>,
    notifier: NotificationBroadcaster,
}

/// Keeps the host's savegame list in sync with the active profile's save
/// directory.
pub struct SaveSyncService {
    shared: Arc<Shared>,
    host: Arc<dyn HostStore>,
    decoder: Arc<dyn SaveDecoder>,
    games: GameTable,
    my_games_root: PathBuf,
    retry: RetryPolicy,
    debounce: Duration,
    phase: SyncPhase,
    watch: DirectoryWatchController,
    trigger: Option<DebouncedTrigger>,
    scanner: Option<SaveScanner>,
    active_profile: Option<String>,
}

impl SaveSyncService {
    pub fn builder() -> SaveSyncServiceBuilder {
        SaveSyncServiceBuilder::new()
    }

    /// Switch to `profile_id`.
    ///
    /// Never fails: per-file, INI and watch problems are reported through
    /// the notification channel and the service carries on.
    pub async fn activate_profile(&mut self, profile_id: &str) -> Activation {
        let Some(profile) = self.host.profile(profile_id) else {
            crate::debug_event!("sync", "unknown profile, ignoring", "{profile_id}");
            return Activation::Cancelled;
        };

        let Some(game) = self.games.get(&profile.game_id) else {
            crate::debug_event!("sync", "unsupported game", "{}", profile.game_id);
            self.stop_watching();
            self.active_profile = None;
            self.scanner = None;
            self.phase = SyncPhase::Idle;
            return Activation::Unsupported {
                game_id: profile.game_id,
            };
        };

        crate::log_event!("sync", "activating", "{} ({})", profile.id, game.name);

        self.phase = SyncPhase::Configuring;
        self.stop_watching();
        let ticket = self.configure(&profile, game).await;

        self.phase = SyncPhase::ScanningInitial;
        let scanner = SaveScanner::new(self.decoder.clone(), game.save_extensions.iter())
            .with_retry(self.retry);
        run_scan(&self.shared, &scanner, &ticket).await;

        self.active_profile = Some(profile.id);
        self.scanner = Some(scanner.clone());
        self.start_watching(scanner, ticket).await
    }

    /// Run one scan pass over the active directory right away.
    pub async fn rescan(&self) -> usize {
        let ticket = self.shared.synchronizer.lock().current_ticket();
        match (ticket, &self.scanner) {
            (Some(ticket), Some(scanner)) => run_scan(&self.shared, scanner, &ticket).await,
            _ => 0,
        }
    }

    /// Close the watch and go idle. Known saves stay in the store.
    pub fn teardown(&mut self) {
        self.stop_watching();
        self.active_profile = None;
        self.scanner = None;
        self.phase = SyncPhase::Idle;
        crate::log_event!("sync", "idle");
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn active_profile(&self) -> Option<&str> {
        self.active_profile.as_deref()
    }

    pub fn watched_directory(&self) -> Option<PathBuf> {
        self.watch.active().map(|binding| binding.directory().to_path_buf())
    }

    pub fn known_save_count(&self) -> usize {
        self.shared.synchronizer.lock().store().len()
    }

    pub fn knows_save(&self, id: &SaveId) -> bool {
        self.shared.synchronizer.lock().contains(id)
    }

    pub fn notifications(&self) -> &NotificationBroadcaster {
        &self.shared.notifier
    }

    /// Write the save path into the game INI and reset the store for the
    /// resulting directory.
    async fn configure(&mut self, profile: &ProfileState, game: &GameSupport) -> ScanTicket {
        let local_path = local_save_path(profile);
        let ini_path = game.ini_path(&self.my_games_root);

        if let Err(e) = ini::write_local_save_path(&ini_path, &local_path).await {
            tracing::warn!("[sync] {e}");
            self.shared
                .notifier
                .send(UserNotification::warning(CONFIG_FAILURE_TITLE, e.to_string()));
        }

        let directory = effective_save_dir(&game.game_dir(&self.my_games_root), &local_path);

        let mut synchronizer = self.shared.synchronizer.lock();
        let ticket = synchronizer.activate_directory(directory);
        synchronizer.set_local_save_path(&profile.id, local_path);
        ticket
    }

    async fn start_watching(&mut self, scanner: SaveScanner, ticket: ScanTicket) -> Activation {
        let directory = ticket.directory().to_path_buf();

        let shared = self.shared.clone();
        let trigger = DebouncedTrigger::spawn(self.debounce, move || {
            let shared = shared.clone();
            let scanner = scanner.clone();
            let ticket = ticket.clone();
            async move {
                run_scan(&shared, &scanner, &ticket).await;
            }
        });
        let handle = trigger.handle();

        // The game only creates the directory on first save.
        let attached = tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|e| e.to_string())
            .and_then(|_| {
                self.watch
                    .attach(&directory, move || {
                        handle.schedule();
                    })
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            });

        match attached {
            Ok(()) => {
                self.trigger = Some(trigger);
                self.phase = SyncPhase::Watching;
                Activation::Watching { directory }
            }
            Err(reason) => {
                tracing::warn!("[sync] failed to watch {}: {reason}", directory.display());
                self.shared.notifier.send(UserNotification::warning(
                    WATCH_FAILURE_TITLE,
                    format!("{}: {reason}", directory.display()),
                ));
                self.phase = SyncPhase::Unwatched;
                Activation::Unwatched { directory }
            }
        }
    }

    fn stop_watching(&mut self) {
        // Drop the trigger first so a pending debounce can't start a scan of
        // the old directory.
        self.trigger = None;
        self.watch.detach();
    }
}

/// Scan the ticket's directory and merge the result. Returns the number of
/// new records found.
async fn run_scan(shared: &Shared, scanner: &SaveScanner, ticket: &ScanTicket) -> usize {
    let _gate = shared.scan_gate.lock().await;

    if !shared.synchronizer.lock().is_current(ticket) {
        crate::debug_event!("sync", "skipping stale scan", "{}", ticket.directory().display());
        return 0;
    }

    let result = match scanner
        .scan(ticket.directory(), |id| shared.synchronizer.lock().contains(id))
        .await
    {
        Ok(result) => result,
        Err(e) => {
            report_scan_error(shared, &e);
            return 0;
        }
    };

    let found = result.new_records.len();
    let applied = shared.synchronizer.lock().apply_scan(ticket, result);
    match applied {
        Ok(failures) => {
            if !failures.is_empty() {
                shared.notifier.send(decode_failure_notification(&failures));
            }
            found
        }
        Err(e) => {
            crate::debug_event!("sync", "discarded", "{e}");
            0
        }
    }
}

fn report_scan_error(shared: &Shared, error: &ScanError) {
    tracing::warn!("[sync] {error}");
    shared
        .notifier
        .send(UserNotification::warning(DECODE_FAILURE_TITLE, error.to_string()));
}

/// One warning listing every failed file.
fn decode_failure_notification(failures: &[DecodeFailure]) -> UserNotification {
    let payload: serde_json::Map<String, serde_json::Value> = failures
        .iter()
        .map(|f| (f.file_name.clone(), serde_json::Value::String(f.message.clone())))
        .collect();
    UserNotification::warning_payload(DECODE_FAILURE_TITLE, serde_json::Value::Object(payload))
}

/// `SLocalSavePath` value for a profile.
pub fn local_save_path(profile: &ProfileState) -> String {
    if profile.local_saves {
        format!("Saves\\{}\\", profile.id)
    } else {
        "Saves\\".to_string()
    }
}

/// Resolve an INI-style relative save path below the game directory.
pub fn effective_save_dir(game_dir: &Path, local_path: &str) -> PathBuf {
    local_path
        .split(['\\', '/'])
        .filter(|part| !part.is_empty())
        .fold(game_dir.to_path_buf(), |dir, part| dir.join(part))
}

/// Builder for constructing a [`SaveSyncService`].
pub struct SaveSyncServiceBuilder {
    host: Option<Arc<dyn HostStore>>,
    decoder: Option<Arc<dyn SaveDecoder>>,
    notifier: Option<NotificationBroadcaster>,
    games: GameTable,
    my_games_root: Option<PathBuf>,
    retry: RetryPolicy,
    debounce: Duration,
}

impl SaveSyncServiceBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            host: None,
            decoder: None,
            notifier: None,
            games: GameTable::new(),
            my_games_root: None,
            retry: RetryPolicy::default(),
            debounce: Duration::from_millis(1000),
        }
    }

    pub fn host(mut self, host: Arc<dyn HostStore>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn SaveDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn notifier(mut self, notifier: NotificationBroadcaster) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Root of the per-game "My Games" folders.
    pub fn my_games_root(mut self, root: PathBuf) -> Self {
        self.my_games_root = Some(root);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn build(self) -> Result<SaveSyncService, SyncError> {
        let host = self.host.ok_or_else(|| SyncError::MissingComponent {
            reason: "Host store".to_string(),
        })?;
        let decoder = self.decoder.ok_or_else(|| SyncError::MissingComponent {
            reason: "Save decoder".to_string(),
        })?;
        let my_games_root = self
            .my_games_root
            .or_else(default_my_games_root)
            .ok_or(SyncError::NoMyGamesRoot)?;

        let shared = Arc::new(Shared {
            synchronizer: parking_lot::Mutex::new(SaveStoreSynchronizer::new(host.clone())),
            scan_gate: tokio::sync::Mutex::new(()),
            notifier: self.notifier.unwrap_or_default(),
        });

        Ok(SaveSyncService {
            shared,
            host,
            decoder,
            games: self.games,
            my_games_root,
            retry: self.retry,
            debounce: self.debounce,
            phase: SyncPhase::Idle,
            watch: DirectoryWatchController::new(),
            trigger: None,
            scanner: None,
            active_profile: None,
        })
    }
}

impl Default for SaveSyncServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
