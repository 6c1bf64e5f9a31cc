//! Position synchronisation.
//!
//! [`PositionSync`] keeps a UI-facing [`PlaybackSnapshot`] fresh. While the
//! session is playing and the user is not scrubbing, a Tokio task samples the
//! pipeline clock on a fixed cadence and republishes it through a
//! [`watch`](tokio::sync::watch) channel. Polling stops entirely while paused
//! or scrubbing. After every load a one-shot settle task performs an
//! authoritative refresh so the duration becomes known before playback.
//!
//! All publication happens under one lock together with a generation check,
//! so a pause that has been processed can never be overwritten by a poll
//! sample taken before it.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use framestep::PositionSync;
//!
//! # async fn example() {
//! let sync = PositionSync::new(
//!     tokio::runtime::Handle::current(),
//!     Duration::from_millis(100),
//!     Duration::from_millis(500),
//! );
//! let mut updates = sync.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = *updates.borrow();
//!     println!("{} / {} ms", snapshot.position_ms, snapshot.duration_ms);
//! }
//! # }
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    runtime::Handle,
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_stream::wrappers::WatchStream;

use crate::{
    conversion::{duration_or_sentinel_ms, duration_to_ms},
    pipeline::PositionSource,
};

/// The state triple published to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    /// Mirror of the pipeline's playing signal.
    pub is_playing: bool,
    /// Playback position in milliseconds, never negative.
    pub position_ms: i64,
    /// Media duration in milliseconds; `1` while unknown.
    pub duration_ms: i64,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            is_playing: false,
            position_ms: 0,
            duration_ms: 1,
        }
    }
}

struct SyncState {
    /// Bumped whenever the polling conditions change; a poller only
    /// publishes while its generation is current.
    generation: u64,
    /// Bumped on every load; a settle task only refreshes for its own load.
    load_epoch: u64,
    playing: bool,
    scrubbing: bool,
    scrub_position_ms: Option<i64>,
    source: Option<Arc<dyn PositionSource>>,
    poller: Option<JoinHandle<()>>,
    settle: Option<JoinHandle<()>>,
}

struct Shared {
    state: Mutex<SyncState>,
    sender: watch::Sender<PlaybackSnapshot>,
    runtime: Handle,
    poll_interval: Duration,
    settle_delay: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sample(state: &SyncState) -> PlaybackSnapshot {
        match &state.source {
            Some(source) => PlaybackSnapshot {
                is_playing: state.playing,
                position_ms: duration_to_ms(source.position()),
                duration_ms: duration_or_sentinel_ms(source.duration()),
            },
            None => PlaybackSnapshot {
                is_playing: state.playing,
                ..PlaybackSnapshot::default()
            },
        }
    }

    fn publish(&self, state: &SyncState) {
        self.sender.send_replace(Self::sample(state));
    }

    /// Cancel any running poller and start a new one if polling is allowed.
    fn restart_polling(self: &Arc<Self>, state: &mut SyncState) {
        state.generation = state.generation.wrapping_add(1);
        if let Some(poller) = state.poller.take() {
            poller.abort();
        }

        if state.playing && !state.scrubbing && state.source.is_some() {
            let generation = state.generation;
            let shared = Arc::clone(self);
            state.poller = Some(self.runtime.spawn(poll_loop(shared, generation)));
            log::trace!("Position polling started (generation {generation})");
        }
    }
}

async fn poll_loop(shared: Arc<Shared>, generation: u64) {
    let mut ticker = tokio::time::interval(shared.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let state = shared.lock();
        if state.generation != generation || !state.playing || state.scrubbing {
            break;
        }
        shared.publish(&state);
    }
}

async fn settle_refresh(shared: Arc<Shared>, load_epoch: u64) {
    tokio::time::sleep(shared.settle_delay).await;
    let state = shared.lock();
    if state.load_epoch == load_epoch && !state.scrubbing {
        shared.publish(&state);
        log::debug!("Settle refresh published {:?}", *shared.sender.borrow());
    }
}

/// Publishes the live playback position while playing.
///
/// Cheap to clone; clones share the same channel and polling task.
#[derive(Clone)]
pub struct PositionSync {
    shared: Arc<Shared>,
}

impl Debug for PositionSync {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let state = self.shared.lock();
        f.debug_struct("PositionSync")
            .field("playing", &state.playing)
            .field("scrubbing", &state.scrubbing)
            .field("polling", &state.poller.is_some())
            .field("poll_interval", &self.shared.poll_interval)
            .field("settle_delay", &self.shared.settle_delay)
            .finish_non_exhaustive()
    }
}

impl PositionSync {
    /// Create a synchroniser that spawns its tasks on `runtime`.
    pub fn new(runtime: Handle, poll_interval: Duration, settle_delay: Duration) -> Self {
        let (sender, _) = watch::channel(PlaybackSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SyncState {
                    generation: 0,
                    load_epoch: 0,
                    playing: false,
                    scrubbing: false,
                    scrub_position_ms: None,
                    source: None,
                    poller: None,
                    settle: None,
                }),
                sender,
                runtime,
                poll_interval,
                settle_delay,
            }),
        }
    }

    /// Subscribe to snapshot updates.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.shared.sender.subscribe()
    }

    /// Snapshot updates as a [`Stream`](tokio_stream::Stream). The current
    /// value is yielded first.
    pub fn stream(&self) -> WatchStream<PlaybackSnapshot> {
        WatchStream::new(self.subscribe())
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        *self.shared.sender.borrow()
    }

    /// Bind to a freshly loaded session's clock.
    ///
    /// Supersedes everything in flight: cancels polling and any pending
    /// settle refresh, leaves scrub mode, publishes `(false, 0, duration)`
    /// immediately and schedules the settle refresh.
    pub fn attach(&self, source: Option<Arc<dyn PositionSource>>) {
        let mut state = self.shared.lock();
        state.source = source;
        state.playing = false;
        state.scrubbing = false;
        state.scrub_position_ms = None;
        state.load_epoch = state.load_epoch.wrapping_add(1);
        self.shared.restart_polling(&mut state);

        let duration_ms = state
            .source
            .as_ref()
            .map(|source| duration_or_sentinel_ms(source.duration()))
            .unwrap_or(1);
        self.shared.sender.send_replace(PlaybackSnapshot {
            is_playing: false,
            position_ms: 0,
            duration_ms,
        });

        if let Some(settle) = state.settle.take() {
            settle.abort();
        }
        let load_epoch = state.load_epoch;
        let shared = Arc::clone(&self.shared);
        state.settle = Some(self.shared.runtime.spawn(settle_refresh(shared, load_epoch)));
    }

    /// Unbind from a released session and publish the idle snapshot.
    pub fn detach(&self) {
        let mut state = self.shared.lock();
        state.source = None;
        state.playing = false;
        state.scrubbing = false;
        state.scrub_position_ms = None;
        state.load_epoch = state.load_epoch.wrapping_add(1);
        self.shared.restart_polling(&mut state);
        if let Some(settle) = state.settle.take() {
            settle.abort();
        }
        self.shared.sender.send_replace(PlaybackSnapshot::default());
    }

    /// Mirror a pipeline is-playing change.
    ///
    /// Starts or stops polling and publishes the new playing state at once.
    /// While scrubbing only the playing flag changes; the scrubbed position
    /// stays untouched.
    pub fn on_playing_changed(&self, playing: bool) {
        let mut state = self.shared.lock();
        state.playing = playing;
        self.shared.restart_polling(&mut state);

        if state.scrubbing {
            self.shared.sender.send_modify(|snapshot| snapshot.is_playing = playing);
        } else {
            self.shared.publish(&state);
        }
    }

    /// Publish the live position now, e.g. after a step while paused.
    /// Suppressed while scrubbing.
    pub fn refresh(&self) {
        let state = self.shared.lock();
        if !state.scrubbing {
            self.shared.publish(&state);
        }
    }

    /// Enter scrub mode: polling stops and nothing is published until the
    /// scrub is committed. The scrub starts from the live clock position.
    /// Returns `false` if already scrubbing.
    pub fn begin_scrub(&self) -> bool {
        let mut state = self.shared.lock();
        if state.scrubbing {
            return false;
        }
        // The published value can be one poll interval stale while playing.
        let start_ms = match &state.source {
            Some(source) => duration_to_ms(source.position()),
            None => self.shared.sender.borrow().position_ms,
        };
        state.scrubbing = true;
        state.scrub_position_ms = Some(start_ms);
        self.shared.restart_polling(&mut state);
        true
    }

    /// Record the locally held scrub position. Ignored outside scrub mode.
    pub fn scrub_to(&self, position_ms: i64) {
        let mut state = self.shared.lock();
        if state.scrubbing {
            state.scrub_position_ms = Some(position_ms.max(0));
        }
    }

    /// The locally held scrub position, if scrubbing.
    pub fn scrub_position(&self) -> Option<i64> {
        let state = self.shared.lock();
        if state.scrubbing {
            state.scrub_position_ms
        } else {
            None
        }
    }

    /// `true` while in scrub mode.
    pub fn is_scrubbing(&self) -> bool {
        self.shared.lock().scrubbing
    }

    /// Leave scrub mode and hand back the position to commit.
    ///
    /// Polling stays suspended until [`resume`](PositionSync::resume), so the
    /// caller can issue its seek first.
    pub fn commit_scrub(&self) -> Option<i64> {
        let mut state = self.shared.lock();
        if !state.scrubbing {
            return None;
        }
        state.scrubbing = false;
        state.scrub_position_ms.take()
    }

    /// Publish the live position and restart polling if playing.
    pub fn resume(&self) {
        let mut state = self.shared.lock();
        self.shared.restart_polling(&mut state);
        if !state.scrubbing {
            self.shared.publish(&state);
        }
    }

    /// `true` while a polling task is scheduled.
    pub fn is_polling(&self) -> bool {
        self.shared.lock().poller.is_some()
    }
}
