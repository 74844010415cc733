//! Live tracking of the active save directory.
//!
//! # Architecture
//!
//! ```text
//! DirectoryWatchController
//!   - at most one notify::RecommendedWatcher (WatchBinding)
//!   - every event -> TriggerHandle::schedule()
//!         |
//! DebouncedTrigger
//!   - Debouncer (quiet period)
//!   - runs the bound rescan, one at a time
//! ```

mod controller;
mod debouncer;
mod error;

pub use controller::{DirectoryWatchController, WatchBinding};
pub use debouncer::{DebouncedTrigger, Debouncer, TriggerHandle};
pub use error::WatchError;
