//! Coalescing of file change bursts into a single rescan.
//!
//! The game writes a save as several separate writes (screenshot, body,
//! co-save). Without debouncing each of them would trigger a full rescan.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until};

/// Tracks the most recent change and reports when things have gone quiet.
#[derive(Debug)]
pub struct Debouncer {
    /// Timestamp of the latest recorded change.
    pending: Option<Instant>,
    /// How long nothing may change before the action fires.
    duration: Duration,
}

impl Debouncer {
    /// Create a new debouncer with the given duration in milliseconds.
    pub fn new(debounce_ms: u64) -> Self {
        Self::with_duration(Duration::from_millis(debounce_ms))
    }

    pub fn with_duration(duration: Duration) -> Self {
        Self {
            pending: None,
            duration,
        }
    }

    /// Record a change now, restarting the quiet period.
    pub fn record(&mut self) {
        self.record_at(Instant::now());
    }

    /// Record a change that happened at `at`.
    ///
    /// Out-of-order timestamps never move the deadline backwards.
    pub fn record_at(&mut self, at: Instant) {
        self.pending = Some(match self.pending {
            Some(last) if last > at => last,
            _ => at,
        });
    }

    /// When the pending change becomes ready, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|last| last + self.duration)
    }

    /// Consume the pending change if it has been quiet long enough.
    pub fn take_ready(&mut self) -> bool {
        self.take_ready_at(Instant::now())
    }

    pub fn take_ready_at(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Check if there are any pending changes.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Cloneable, thread-safe handle for scheduling a [`DebouncedTrigger`].
///
/// Safe to call from notify's callback thread.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::UnboundedSender<Instant>,
}

impl TriggerHandle {
    /// Request the bound action. Returns `false` once the trigger is gone.
    pub fn schedule(&self) -> bool {
        self.tx.send(Instant::now()).is_ok()
    }
}

/// Runs a bound async action once things have been quiet for the debounce
/// period.
///
/// The action runs on the trigger's own task, so at most one instance runs
/// at a time. Calls made while it runs are remembered and cause exactly one
/// more run once the quiet period after the last call has passed.
///
/// Dropping the trigger stops it; an action that is already running is
/// allowed to finish.
pub struct DebouncedTrigger {
    handle: TriggerHandle,
    _shutdown: oneshot::Sender<()>,
}

impl DebouncedTrigger {
    /// Spawn the trigger task on the current tokio runtime.
    pub fn spawn<F, Fut>(duration: Duration, action: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(run_trigger(
            Debouncer::with_duration(duration),
            rx,
            shutdown_rx,
            action,
        ));

        Self {
            handle: TriggerHandle { tx },
            _shutdown: shutdown_tx,
        }
    }

    pub fn schedule(&self) -> bool {
        self.handle.schedule()
    }

    pub fn handle(&self) -> TriggerHandle {
        self.handle.clone()
    }
}

async fn run_trigger<F, Fut>(
    mut debouncer: Debouncer,
    mut rx: mpsc::UnboundedReceiver<Instant>,
    mut shutdown: oneshot::Receiver<()>,
    mut action: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let deadline = debouncer.deadline();

        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            received = rx.recv() => match received {
                Some(at) => debouncer.record_at(at),
                None => break,
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if debouncer.take_ready() {
                    crate::debug_event!("debounce", "fired");
                    action().await;
                }
            }
        }
    }

    crate::debug_event!("debounce", "stopped");
}
