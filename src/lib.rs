//! Discover, decode and live-track Creation Engine savegames.
//!
//! The core pieces, leaf first:
//! - [`decoder`]: save file -> [`SaveMetadata`]
//! - [`scanner`]: one pass over a save directory with lock retries
//! - [`store`]: the known saves and the merge logic
//! - [`watcher`]: debounced filesystem watch on the save directory
//! - [`sync`]: profile activation tying it all together

pub mod cli;
pub mod config;
pub mod decoder;
pub mod games;
pub mod host;
pub mod ini;
pub mod logging;
pub mod notifications;
pub mod scanner;
pub mod store;
pub mod sync;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use decoder::{DecodeError, GamebryoDecoder, SaveDecoder};
pub use games::{GameSupport, GameTable};
pub use host::{HostEvent, HostState, HostStore, MemoryHostStore, ProfileState};
pub use notifications::{NotificationBroadcaster, UserNotification};
pub use scanner::{RetryPolicy, SaveScanner, ScanError};
pub use store::{SaveStore, SaveStoreSynchronizer, ScanTicket};
pub use sync::{Activation, SaveSyncService, SyncPhase};
pub use types::*;
