//! End-to-end profile activation against a temporary "My Games" tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use savewatch::notifications::NotificationBody;
use savewatch::{
    Activation, DecodeError, MemoryHostStore, ProfileState, SaveDecoder, SaveId, SaveMetadata,
    SaveSyncService, Screenshot, SyncPhase, UserNotification, ini,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Decodes everything except files whose name contains "corrupt".
struct NameDecoder;

#[async_trait]
impl SaveDecoder for NameDecoder {
    async fn decode(&self, path: &Path) -> Result<SaveMetadata, DecodeError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if name.contains("corrupt") {
            return Err(DecodeError::Format("bad magic".to_string()));
        }
        Ok(metadata(name))
    }
}

/// Like [`NameDecoder`], but takes `delay` for every file below `slow_dir`.
struct SlowDirDecoder {
    slow_dir: PathBuf,
    delay: Duration,
    started: AtomicBool,
}

#[async_trait]
impl SaveDecoder for SlowDirDecoder {
    async fn decode(&self, path: &Path) -> Result<SaveMetadata, DecodeError> {
        if path.starts_with(&self.slow_dir) {
            self.started.store(true, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
        }
        NameDecoder.decode(path).await
    }
}

fn metadata(name: String) -> SaveMetadata {
    SaveMetadata {
        save_number: 1,
        character_name: name,
        level: 1,
        location: String::new(),
        game_time: String::new(),
        race: String::new(),
        plugins: Vec::new(),
        screenshot: Screenshot {
            width: 0,
            height: 0,
            bytes_per_pixel: 3,
            pixels: Vec::new(),
        },
        created_at: None,
    }
}

fn profile(id: &str, game_id: &str, local_saves: bool) -> ProfileState {
    ProfileState {
        id: id.to_string(),
        name: id.to_string(),
        game_id: game_id.to_string(),
        local_saves,
    }
}

struct Fixture {
    root: TempDir,
    host: Arc<MemoryHostStore>,
    service: SaveSyncService,
    notifications: broadcast::Receiver<UserNotification>,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        Self::with_root(root, root_path)
    }

    fn with_root(root: TempDir, my_games: fn(&Path) -> PathBuf) -> Self {
        Self::build(root, my_games, Arc::new(NameDecoder))
    }

    fn with_decoder(root: TempDir, decoder: Arc<dyn SaveDecoder>) -> Self {
        Self::build(root, root_path, decoder)
    }

    fn build(
        root: TempDir,
        my_games: fn(&Path) -> PathBuf,
        decoder: Arc<dyn SaveDecoder>,
    ) -> Self {
        let host = Arc::new(MemoryHostStore::with_profiles([
            profile("survival", "skyrimse", true),
            profile("vanilla", "skyrimse", false),
            profile("wasteland", "fallout4", false),
            profile("morrowind", "morrowind", false),
        ]));
        let service = SaveSyncService::builder()
            .host(host.clone())
            .decoder(decoder)
            .my_games_root(my_games(root.path()))
            .debounce(Duration::from_millis(100))
            .build()
            .unwrap();
        let notifications = service.notifications().subscribe();
        Self {
            root,
            host,
            service,
            notifications,
        }
    }

    fn skyrim_dir(&self) -> PathBuf {
        self.root.path().join("Skyrim Special Edition")
    }

    fn drain_notifications(&mut self) -> Vec<UserNotification> {
        let mut received = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            received.push(notification);
        }
        received
    }
}

fn root_path(root: &Path) -> PathBuf {
    root.to_path_buf()
}

fn touch(dir: &Path, names: &[&str]) {
    std::fs::create_dir_all(dir).unwrap();
    for name in names {
        std::fs::write(dir.join(name), b"").unwrap();
    }
}

async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

#[tokio::test]
async fn test_activation_scans_profile_directory_and_writes_ini() {
    let mut fixture = Fixture::new();
    let saves = fixture.skyrim_dir().join("Saves").join("survival");
    touch(&saves, &["save1.ess", "save2.ess", "notes.txt"]);

    let activation = fixture.service.activate_profile("survival").await;

    assert_eq!(
        activation,
        Activation::Watching {
            directory: saves.clone()
        }
    );
    assert_eq!(fixture.service.phase(), SyncPhase::Watching);
    assert_eq!(fixture.service.active_profile(), Some("survival"));
    assert_eq!(fixture.service.watched_directory(), Some(saves));
    assert_eq!(fixture.host.save_count(), 2);
    assert!(fixture.host.has_save(&SaveId::from("save1.ess")));
    assert!(fixture.service.knows_save(&SaveId::from("save2.ess")));
    assert_eq!(
        fixture.host.save_path("survival").as_deref(),
        Some("Saves\\survival\\")
    );

    let ini_path = fixture.skyrim_dir().join("Skyrim.ini");
    assert_eq!(
        ini::read_local_save_path(&ini_path)
            .await
            .unwrap()
            .as_deref(),
        Some("Saves\\survival\\")
    );
    assert!(fixture.drain_notifications().is_empty());
}

#[tokio::test]
async fn test_decode_failures_become_one_warning() {
    let mut fixture = Fixture::new();
    let saves = fixture.skyrim_dir().join("Saves");
    touch(&saves, &["good.ess", "corrupt1.ess", "corrupt2.ess"]);

    fixture.service.activate_profile("vanilla").await;

    assert_eq!(fixture.host.save_count(), 1);
    let notifications = fixture.drain_notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Failed to read savegames");
    assert_eq!(
        notifications[0].body,
        NotificationBody::Payload(serde_json::json!({
            "corrupt1.ess": "invalid savegame: bad magic",
            "corrupt2.ess": "invalid savegame: bad magic",
        }))
    );
}

#[tokio::test]
async fn test_unknown_profile_changes_nothing() {
    let mut fixture = Fixture::new();
    touch(&fixture.skyrim_dir().join("Saves"), &["save1.ess"]);
    fixture.service.activate_profile("vanilla").await;
    assert_eq!(fixture.host.save_count(), 1);

    let activation = fixture.service.activate_profile("nobody").await;

    assert_eq!(activation, Activation::Cancelled);
    assert_eq!(fixture.service.phase(), SyncPhase::Watching);
    assert_eq!(fixture.service.active_profile(), Some("vanilla"));
    assert_eq!(fixture.host.save_count(), 1);
    assert!(fixture.drain_notifications().is_empty());
}

#[tokio::test]
async fn test_unsupported_game_goes_idle() {
    let mut fixture = Fixture::new();

    let activation = fixture.service.activate_profile("morrowind").await;

    assert_eq!(
        activation,
        Activation::Unsupported {
            game_id: "morrowind".to_string()
        }
    );
    assert_eq!(fixture.service.phase(), SyncPhase::Idle);
    assert_eq!(fixture.service.watched_directory(), None);
    assert!(fixture.drain_notifications().is_empty());
}

#[tokio::test]
async fn test_profile_switch_replaces_known_saves() {
    let mut fixture = Fixture::new();
    touch(&fixture.skyrim_dir().join("Saves"), &["vanilla.ess"]);
    touch(
        &fixture.root.path().join("Fallout4").join("Saves"),
        &["wasteland1.fos", "wasteland2.fos"],
    );

    fixture.service.activate_profile("vanilla").await;
    assert!(fixture.host.has_save(&SaveId::from("vanilla.ess")));

    let activation = fixture.service.activate_profile("wasteland").await;

    assert!(matches!(activation, Activation::Watching { .. }));
    assert_eq!(fixture.host.save_count(), 2);
    assert!(!fixture.host.has_save(&SaveId::from("vanilla.ess")));
    assert!(!fixture.service.knows_save(&SaveId::from("vanilla.ess")));
    assert_eq!(
        fixture.service.watched_directory(),
        Some(fixture.root.path().join("Fallout4").join("Saves"))
    );
}

#[tokio::test]
async fn test_profile_switch_discards_in_flight_rescan() {
    let root = TempDir::new().unwrap();
    let skyrim_saves = root.path().join("Skyrim Special Edition").join("Saves");
    let fallout_saves = root.path().join("Fallout4").join("Saves");
    touch(&skyrim_saves, &[]);
    touch(&fallout_saves, &["wasteland1.fos"]);
    let decoder = Arc::new(SlowDirDecoder {
        slow_dir: skyrim_saves.clone(),
        delay: Duration::from_millis(800),
        started: AtomicBool::new(false),
    });
    let mut fixture = Fixture::with_decoder(root, decoder.clone());

    fixture.service.activate_profile("vanilla").await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    touch(&skyrim_saves, &["old1.ess", "old2.ess"]);

    // The debounced rescan is now stuck decoding the old directory.
    let slow = decoder.clone();
    assert!(wait_until(Duration::from_secs(5), || slow.started.load(Ordering::SeqCst)).await);

    let activation = fixture.service.activate_profile("wasteland").await;
    assert_eq!(
        activation,
        Activation::Watching {
            directory: fallout_saves
        }
    );

    // Give the old pass time to finish and try to apply its result.
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(fixture.host.save_count(), 1);
    assert!(fixture.host.has_save(&SaveId::from("wasteland1.fos")));
    for old in ["old1.ess", "old2.ess"] {
        assert!(!fixture.host.has_save(&SaveId::from(old)));
        assert!(!fixture.service.knows_save(&SaveId::from(old)));
    }
    assert!(fixture.drain_notifications().is_empty());
}

#[tokio::test]
async fn test_new_save_is_picked_up_by_watch() {
    let mut fixture = Fixture::new();
    let saves = fixture.skyrim_dir().join("Saves");
    touch(&saves, &["save1.ess"]);

    fixture.service.activate_profile("vanilla").await;
    assert_eq!(fixture.host.save_count(), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    touch(&saves, &["save2.ess", "save2.skse"]);

    let host = fixture.host.clone();
    assert!(wait_until(Duration::from_secs(5), || host.save_count() == 2).await);
    assert!(fixture.host.has_save(&SaveId::from("save2.ess")));
}

#[tokio::test]
async fn test_missing_save_directory_is_created_and_watched() {
    let mut fixture = Fixture::new();
    let saves = fixture.skyrim_dir().join("Saves").join("survival");

    let activation = fixture.service.activate_profile("survival").await;

    assert_eq!(
        activation,
        Activation::Watching {
            directory: saves.clone()
        }
    );
    assert!(saves.is_dir());
    assert_eq!(fixture.host.save_count(), 0);
}

#[tokio::test]
async fn test_rescan_only_adds_new_saves() {
    let mut fixture = Fixture::new();
    let saves = fixture.skyrim_dir().join("Saves");
    touch(&saves, &["save1.ess"]);

    fixture.service.activate_profile("vanilla").await;
    assert_eq!(fixture.service.rescan().await, 0);

    touch(&saves, &["save2.ess"]);
    assert_eq!(fixture.service.rescan().await, 1);
    assert_eq!(fixture.host.save_count(), 2);
}

#[tokio::test]
async fn test_teardown_keeps_saves_and_goes_idle() {
    let mut fixture = Fixture::new();
    touch(&fixture.skyrim_dir().join("Saves"), &["save1.ess"]);
    fixture.service.activate_profile("vanilla").await;

    fixture.service.teardown();

    assert_eq!(fixture.service.phase(), SyncPhase::Idle);
    assert_eq!(fixture.service.watched_directory(), None);
    assert_eq!(fixture.service.active_profile(), None);
    assert_eq!(fixture.host.save_count(), 1);
    assert_eq!(fixture.service.rescan().await, 0);
}

#[tokio::test]
async fn test_unwatchable_directory_reports_warning() {
    let root = TempDir::new().unwrap();
    // "My Games" is a regular file, so nothing below it can be created
    std::fs::write(root.path().join("My Games"), b"").unwrap();
    let mut fixture = Fixture::with_root(root, |root| root.join("My Games"));

    let activation = fixture.service.activate_profile("vanilla").await;

    assert!(matches!(activation, Activation::Unwatched { .. }));
    assert_eq!(fixture.service.phase(), SyncPhase::Unwatched);
    assert_eq!(fixture.service.watched_directory(), None);

    let titles: Vec<String> = fixture
        .drain_notifications()
        .into_iter()
        .map(|n| n.title)
        .collect();
    assert!(titles.contains(&"Failed to update savegame path".to_string()));
    assert!(titles.contains(&"Can't watch savegame directory".to_string()));
}
