//! Dual-slot orchestrator
//!
//! [`Orchestrator`] is a cheap, clonable handle. All state lives in a single
//! task that owns both slots, the focus arbiter and the in-flight transition;
//! the handle talks to it over a command channel and reads a `watch`
//! snapshot for queries that must never block.
//!
//! # Transition lifecycle
//!
//! ```text
//! NotRunning ─prepare_next─▶ Preparing ─begin_transition─▶ Overlapping
//!                               │                             │ swap (atomic)
//!                               ▼                             ▼
//!                      Failed / Cancelled                  Swapped ─fade done─▶ Settling ─▶ NotRunning
//! ```
//!
//! The swap happens as soon as both slots are audible, not when the fade
//! finishes, so session-visible metadata switches to the incoming media
//! immediately while the audio keeps blending.

mod task;

use crate::config::EngineConfig;
use crate::engine::EngineFactory;
use crate::error::{PlaybackError, Result};
use crate::events::PlaybackEvent;
use crate::focus::{AudioFocusPlatform, FocusListener};
use crate::queue::QueueTimeline;
use crate::transition::TransitionSettings;
use crate::types::{EngineHandle, EngineSnapshot, QueueEntry, RepeatMode, TransitionStatus};
use segue_core::{LocatorResolver, MediaReference};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use task::{OrchestratorTask, TaskChannels};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

/// Callback invoked synchronously with the new Master handle on every swap
pub type SwapListener = Arc<dyn Fn(&EngineHandle) + Send + Sync>;

/// Registration token returned by [`Orchestrator::add_swap_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Current slot volumes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotVolumes {
    pub master: f32,
    pub auxiliary: f32,
}

type Reply<T> = oneshot::Sender<Result<T>>;

pub(crate) enum Command {
    PrepareNext {
        reference: MediaReference,
        start: Duration,
        reply: Reply<EngineHandle>,
    },
    CancelNext {
        reply: Reply<()>,
    },
    BeginTransition {
        settings: Option<TransitionSettings>,
        reply: Reply<EngineHandle>,
    },
    CancelTransition {
        reply: Reply<()>,
    },
    SetPauseAtEnd {
        enabled: bool,
        reply: Reply<()>,
    },
    SetQueue {
        entries: Vec<QueueEntry>,
        index: usize,
        start: Duration,
        reply: Reply<EngineHandle>,
    },
    Play {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Seek {
        position: Duration,
        reply: Reply<()>,
    },
    Position {
        reply: Reply<Duration>,
    },
    SetRepeat {
        mode: RepeatMode,
        reply: Reply<()>,
    },
    SetShuffle {
        enabled: bool,
        reply: Reply<()>,
    },
    Queue {
        reply: Reply<QueueTimeline>,
    },
    Volumes {
        reply: Reply<SlotVolumes>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Registered swap listeners, shared between the handle and the task
#[derive(Default)]
pub(crate) struct SwapListeners {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, SwapListener)>>,
}

impl SwapListeners {
    fn add(&self, listener: SwapListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Call every listener without holding the lock, so a listener may
    /// register or remove listeners itself
    pub(crate) fn notify(&self, master: &EngineHandle) {
        let listeners: Vec<SwapListener> = self
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(master);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, SwapListener)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the dual-slot playback engine
///
/// Every transport and transition call is routed through the orchestrator
/// task; nothing outside it touches a slot. Clones share the same task.
///
/// # Example
///
/// ```ignore
/// let orchestrator = Orchestrator::spawn(config, factory, resolver, platform)?;
/// orchestrator.set_queue(entries, 0, Duration::ZERO).await?;
/// orchestrator.play().await?;
///
/// orchestrator.prepare_next(next_reference, Duration::ZERO).await?;
/// orchestrator
///     .begin_transition(TransitionSettings::symmetric(3000, FadeCurve::EqualPower))
///     .await?;
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<EngineSnapshot>,
    events: broadcast::Sender<PlaybackEvent>,
    swap_listeners: Arc<SwapListeners>,
    active_cancel: Arc<Mutex<CancellationToken>>,
    focus: FocusListener,
}

impl Orchestrator {
    /// Validate `config`, build both slots and start the orchestrator task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        config: EngineConfig,
        factory: Arc<dyn EngineFactory>,
        resolver: Arc<dyn LocatorResolver>,
        platform: Box<dyn AudioFocusPlatform>,
    ) -> Result<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (focus, focus_rx) = FocusListener::channel();
        let (events, _) = broadcast::channel(config.event_capacity);
        let swap_listeners = Arc::new(SwapListeners::default());
        let active_cancel = Arc::new(Mutex::new(CancellationToken::new()));

        let (task, snapshot) = OrchestratorTask::new(
            config,
            factory,
            resolver,
            platform,
            TaskChannels {
                commands: command_rx,
                focus_changes: focus_rx,
                events: events.clone(),
                swap_listeners: Arc::clone(&swap_listeners),
                active_cancel: Arc::clone(&active_cancel),
            },
        );
        tokio::spawn(task.run());

        Ok(Self {
            commands: command_tx,
            snapshot,
            events,
            swap_listeners,
            active_cancel,
            focus,
        })
    }

    /// Load `reference` into the Auxiliary slot, silent and paused
    ///
    /// Supersedes any in-flight transition. Failure leaves the Master
    /// untouched.
    pub async fn prepare_next(
        &self,
        reference: MediaReference,
        start: Duration,
    ) -> Result<EngineHandle> {
        self.cancel_active();
        self.request(|reply| Command::PrepareNext {
            reference,
            start,
            reply,
        })
        .await
    }

    /// Drop prepared Auxiliary media; a no-op when nothing is prepared
    pub async fn cancel_next(&self) -> Result<()> {
        if self.snapshot.borrow().transition == TransitionStatus::Preparing {
            self.cancel_active();
        }
        self.request(|reply| Command::CancelNext { reply }).await
    }

    /// Start crossfading into the prepared Auxiliary
    ///
    /// Returns the new Master handle once the swap has happened; the fade
    /// continues in the background.
    pub async fn begin_transition(&self, settings: TransitionSettings) -> Result<EngineHandle> {
        self.begin(Some(settings)).await
    }

    /// [`begin_transition`](Self::begin_transition) with the configured
    /// default settings
    pub async fn begin_default_transition(&self) -> Result<EngineHandle> {
        self.begin(None).await
    }

    async fn begin(&self, settings: Option<TransitionSettings>) -> Result<EngineHandle> {
        if self.snapshot.borrow().transition.is_overlapping() {
            self.cancel_active();
        }
        self.request(|reply| Command::BeginTransition { settings, reply })
            .await
    }

    /// Abort the current transition, restoring the Master to full volume
    pub async fn cancel_transition(&self) -> Result<()> {
        self.cancel_active();
        self.request(|reply| Command::CancelTransition { reply })
            .await
    }

    pub async fn set_pause_at_end_of_media_items(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetPauseAtEnd { enabled, reply })
            .await
    }

    /// Replace the Master timeline and load the entry at `index`
    ///
    /// Also the way back after a fatal Master failure.
    pub async fn set_queue(
        &self,
        entries: Vec<QueueEntry>,
        index: usize,
        start: Duration,
    ) -> Result<EngineHandle> {
        self.cancel_active();
        self.request(|reply| Command::SetQueue {
            entries,
            index,
            start,
            reply,
        })
        .await
    }

    pub async fn play(&self) -> Result<()> {
        self.request(|reply| Command::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    /// Seek the Master
    pub async fn seek(&self, position: Duration) -> Result<()> {
        self.request(|reply| Command::Seek { position, reply })
            .await
    }

    /// Master playback position
    pub async fn position(&self) -> Result<Duration> {
        self.request(|reply| Command::Position { reply }).await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.request(|reply| Command::SetRepeat { mode, reply })
            .await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.request(|reply| Command::SetShuffle { enabled, reply })
            .await
    }

    /// Copy of the Master timeline
    pub async fn queue(&self) -> Result<QueueTimeline> {
        self.request(|reply| Command::Queue { reply }).await
    }

    pub async fn volumes(&self) -> Result<SlotVolumes> {
        self.request(|reply| Command::Volumes { reply }).await
    }

    /// Stop the task and release both engines
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_active();
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| PlaybackError::Shutdown)?;
        rx.await.map_err(|_| PlaybackError::Shutdown)
    }

    /// Whether a transition is prepared or in flight
    pub fn is_transition_running(&self) -> bool {
        self.snapshot.borrow().transition.is_running()
    }

    /// Session-attachable handle of the current Master
    pub fn master_handle(&self) -> EngineHandle {
        self.snapshot.borrow().master.clone()
    }

    /// Consistent view of both slots
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver that observes every published snapshot
    pub fn watch_snapshot(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Sink for platform audio focus callbacks
    pub fn focus_listener(&self) -> FocusListener {
        self.focus.clone()
    }

    pub fn add_swap_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&EngineHandle) + Send + Sync + 'static,
    {
        self.swap_listeners.add(Arc::new(listener))
    }

    /// Returns `false` if the listener was not registered
    pub fn remove_swap_listener(&self, id: ListenerId) -> bool {
        self.swap_listeners.remove(id)
    }

    /// End the bounded waits of the current session right away
    fn cancel_active(&self) {
        self.active_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| PlaybackError::Shutdown)?;
        rx.await.map_err(|_| PlaybackError::Shutdown)?
    }
}
