//! The orchestrator task: single writer for both slots

use super::{Command, Reply, SlotVolumes, SwapListeners};
use crate::config::EngineConfig;
use crate::engine::EngineFactory;
use crate::error::{EngineError, PlaybackError, Result, WaitStage};
use crate::events::PlaybackEvent;
use crate::focus::{AudioFocusPlatform, FocusArbiter, FocusChange, FocusDirective};
use crate::queue::QueueTimeline;
use crate::slot::{PlaybackSlot, WaitOutcome};
use crate::transition::{TransitionSession, TransitionSettings};
use crate::types::{
    EngineHandle, EngineSnapshot, QueueEntry, SlotId, SlotState, TransitionStatus,
};
use segue_core::{LocatorResolver, MediaReference, ResolvedLocator};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) struct TaskChannels {
    pub commands: mpsc::Receiver<Command>,
    pub focus_changes: mpsc::UnboundedReceiver<FocusChange>,
    pub events: broadcast::Sender<PlaybackEvent>,
    pub swap_listeners: Arc<SwapListeners>,
    pub active_cancel: Arc<Mutex<CancellationToken>>,
}

/// Resolver output; `None` when the session was cancelled first
type Resolution = Option<segue_core::Result<ResolvedLocator>>;

/// Locator resolution polled by the run loop next to commands and focus
struct PendingLoad {
    entry: QueueEntry,
    start: Duration,
    reply: Reply<EngineHandle>,
    resolving: Pin<Box<dyn Future<Output = Resolution> + Send>>,
}

impl PendingLoad {
    fn supersede(self) {
        let _ = self.reply.send(Err(PlaybackError::Cancelled));
    }
}

pub(crate) struct OrchestratorTask {
    config: EngineConfig,
    slots: [PlaybackSlot; 2],
    master: SlotId,
    session: Option<TransitionSession>,
    /// Auxiliary resolution owned by the current session
    preparing: Option<PendingLoad>,
    /// Master resolution for the latest queue
    queue_load: Option<PendingLoad>,
    /// Status reported while no session exists
    idle_status: TransitionStatus,
    next_session_id: u64,
    should_play: bool,
    pause_at_end: bool,
    master_failed: bool,
    focus: FocusArbiter,
    factory: Arc<dyn EngineFactory>,
    resolver: Arc<dyn LocatorResolver>,
    ticker: Interval,
    commands: mpsc::Receiver<Command>,
    focus_changes: mpsc::UnboundedReceiver<FocusChange>,
    snapshot: watch::Sender<EngineSnapshot>,
    events: broadcast::Sender<PlaybackEvent>,
    swap_listeners: Arc<SwapListeners>,
    active_cancel: Arc<Mutex<CancellationToken>>,
}

impl OrchestratorTask {
    pub(crate) fn new(
        config: EngineConfig,
        factory: Arc<dyn EngineFactory>,
        resolver: Arc<dyn LocatorResolver>,
        platform: Box<dyn AudioFocusPlatform>,
        channels: TaskChannels,
    ) -> (Self, watch::Receiver<EngineSnapshot>) {
        let mut master = PlaybackSlot::new(SlotId::A, factory.as_ref());
        master.set_volume(1.0);
        master.set_pause_at_end(config.pause_at_end);
        let mut auxiliary = PlaybackSlot::new(SlotId::B, factory.as_ref());
        auxiliary.set_volume(0.0);

        let initial = EngineSnapshot {
            master: master.handle(),
            auxiliary: auxiliary.handle(),
            transition: TransitionStatus::NotRunning,
            should_play: false,
        };
        let (snapshot, snapshot_rx) = watch::channel(initial);

        let mut ticker = tokio::time::interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = Self {
            pause_at_end: config.pause_at_end,
            config,
            slots: [master, auxiliary],
            master: SlotId::A,
            session: None,
            preparing: None,
            queue_load: None,
            idle_status: TransitionStatus::NotRunning,
            next_session_id: 0,
            should_play: false,
            master_failed: false,
            focus: FocusArbiter::new(platform),
            factory,
            resolver,
            ticker,
            commands: channels.commands,
            focus_changes: channels.focus_changes,
            snapshot,
            events: channels.events,
            swap_listeners: channels.swap_listeners,
            active_cancel: channels.active_cancel,
        };
        (task, snapshot_rx)
    }

    pub(crate) async fn run(mut self) {
        debug!("Orchestrator task started");

        loop {
            let fading = self.is_fading();
            let master = self.master.index();
            let watch_master = !self.master_failed;

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown { reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(change) = self.focus_changes.recv() => self.on_focus_change(change).await,
                Some((load, resolved)) = resolution(&mut self.preparing) => {
                    self.finish_prepare(load, resolved).await;
                }
                Some((load, resolved)) = resolution(&mut self.queue_load) => {
                    self.finish_queue_load(load, resolved).await;
                }
                changed = self.slots[master].status.changed(), if watch_master => match changed {
                    Ok(()) => {
                        let state = *self.slots[master].status.borrow_and_update();
                        self.on_master_state(state).await;
                    }
                    Err(_) => self.on_master_failed("engine status channel closed").await,
                },
                _ = self.ticker.tick(), if fading => self.on_tick().await,
            }
        }

        debug!("Orchestrator task stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::PrepareNext {
                reference,
                start,
                reply,
            } => self.prepare_next(reference, start, reply).await,
            Command::CancelNext { reply } => {
                let _ = reply.send(self.cancel_next().await);
            }
            Command::BeginTransition { settings, reply } => {
                let _ = reply.send(self.begin_transition(settings).await);
            }
            Command::CancelTransition { reply } => {
                let _ = reply.send(self.cancel_transition().await);
            }
            Command::SetPauseAtEnd { enabled, reply } => {
                self.pause_at_end = enabled;
                if !self.is_overlapping() {
                    self.master_slot().set_pause_at_end(enabled);
                }
                let _ = reply.send(Ok(()));
            }
            Command::SetQueue {
                entries,
                index,
                start,
                reply,
            } => self.set_queue(entries, index, start, reply).await,
            Command::Play { reply } => {
                let _ = reply.send(self.play().await);
            }
            Command::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            Command::Seek { position, reply } => {
                let _ = reply.send(self.seek(position).await);
            }
            Command::Position { reply } => {
                let _ = reply.send(Ok(self.master_slot().position()));
            }
            Command::SetRepeat { mode, reply } => {
                self.master_slot().timeline.set_repeat(mode);
                let _ = reply.send(Ok(()));
            }
            Command::SetShuffle { enabled, reply } => {
                self.master_slot().timeline.set_shuffle(enabled);
                let _ = reply.send(Ok(()));
            }
            Command::Queue { reply } => {
                let _ = reply.send(Ok(self.master_slot().timeline().clone()));
            }
            Command::Volumes { reply } => {
                let _ = reply.send(Ok(SlotVolumes {
                    master: self.slots[self.master.index()].volume(),
                    auxiliary: self.slots[self.aux_index()].volume(),
                }));
            }
            // Handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    // ===== Transition =====

    async fn prepare_next(
        &mut self,
        reference: MediaReference,
        start: Duration,
        reply: Reply<EngineHandle>,
    ) {
        if let Err(e) = self.ensure_master_alive() {
            let _ = reply.send(Err(e));
            return;
        }
        self.discard_session().await;

        let entry = self.entry_for(&reference);
        let cancel = self.new_cancel_token();
        self.next_session_id += 1;
        self.session = Some(TransitionSession::new(
            self.next_session_id,
            entry.clone(),
            cancel.clone(),
        ));
        self.publish();
        debug!(media = %entry.id, session = self.next_session_id, "Preparing auxiliary");

        let aux = self.aux_index();
        if let Err(e) = self.slots[aux].stop_and_clear().await {
            debug!(slot = %self.master.other(), error = %e, "Auxiliary stop failed");
        }
        self.slots[aux].set_volume(0.0);

        let resolver = Arc::clone(&self.resolver);
        let reference = entry.reference.clone();
        self.preparing = Some(PendingLoad {
            entry,
            start,
            reply,
            resolving: Box::pin(async move {
                until_cancelled(&cancel, resolver.resolve(&reference)).await
            }),
        });
    }

    async fn finish_prepare(&mut self, load: PendingLoad, resolved: Resolution) {
        let PendingLoad {
            entry,
            start,
            reply,
            ..
        } = load;
        let result = self.load_auxiliary(entry, start, resolved).await;
        let _ = reply.send(result);
    }

    async fn load_auxiliary(
        &mut self,
        entry: QueueEntry,
        start: Duration,
        resolved: Resolution,
    ) -> Result<EngineHandle> {
        let locator = match resolved {
            None => return Err(self.fail_prepare(&entry, PlaybackError::Cancelled).await),
            Some(Err(e)) => return Err(self.fail_prepare(&entry, e.into()).await),
            Some(Ok(locator)) => locator,
        };
        let Some(cancel) = self.session.as_ref().map(|session| session.cancel.clone()) else {
            return Err(PlaybackError::Cancelled);
        };

        let aux = self.aux_index();
        let loaded = until_cancelled(
            &cancel,
            self.load_slot(aux, entry.clone(), &locator, start),
        )
        .await;
        match loaded {
            None => return Err(self.fail_prepare(&entry, PlaybackError::Cancelled).await),
            Some(Err(e)) => return Err(self.fail_prepare(&entry, e).await),
            Some(Ok(())) => {}
        }

        // Parked: silent and paused so it can start instantly
        self.slots[aux].set_volume(0.0);
        if let Err(e) = self.slots[aux].pause().await {
            debug!(error = %e, "Auxiliary pause after load failed");
        }

        let handle = self.slots[aux].handle();
        self.publish();
        info!(slot = %handle.slot, media = %entry.id, "Auxiliary prepared");
        self.emit(PlaybackEvent::Prepared {
            slot: handle.slot,
            media_id: entry.id,
        });
        Ok(handle)
    }

    /// Engine `load`, bounded by the configured timeout
    async fn load_slot(
        &mut self,
        index: usize,
        entry: QueueEntry,
        locator: &ResolvedLocator,
        start: Duration,
    ) -> Result<()> {
        let limit = self.config.load_timeout();
        match tokio::time::timeout(limit, self.slots[index].load(entry, locator, start)).await {
            Ok(loaded) => loaded.map_err(PlaybackError::Load),
            Err(_) => Err(PlaybackError::ReadinessTimeout {
                stage: WaitStage::EngineLoad,
                waited: limit,
            }),
        }
    }

    async fn fail_prepare(&mut self, entry: &QueueEntry, error: PlaybackError) -> PlaybackError {
        self.reset_auxiliary().await;

        if error == PlaybackError::Cancelled {
            debug!(media = %entry.id, "Preparation superseded");
            self.finish_session(TransitionStatus::Cancelled);
            self.emit(PlaybackEvent::TransitionCancelled);
        } else {
            warn!(media = %entry.id, error = %error, "Preparation failed, keeping current media");
            self.finish_session(TransitionStatus::Failed);
            self.emit(PlaybackEvent::PrepareFailed {
                media_id: entry.id.clone(),
                reason: error.to_string(),
            });
        }
        error
    }

    async fn cancel_next(&mut self) -> Result<()> {
        let preparing = self
            .session
            .as_ref()
            .is_some_and(|session| session.status == TransitionStatus::Preparing);
        if !preparing {
            return Ok(());
        }

        debug!("Cancelling prepared auxiliary");
        self.cancel_session_token();
        self.reset_auxiliary().await;
        self.restore_master();
        self.finish_session(TransitionStatus::Cancelled);
        self.emit(PlaybackEvent::TransitionCancelled);
        Ok(())
    }

    async fn begin_transition(
        &mut self,
        settings: Option<TransitionSettings>,
    ) -> Result<EngineHandle> {
        self.ensure_master_alive()?;
        let settings = settings.unwrap_or(self.config.default_transition);

        // A newer request supersedes a fade that is still running
        if self.is_overlapping() {
            self.settle(TransitionStatus::Cancelled).await;
        }

        let aux = self.aux_index();
        let cancel = match &self.session {
            Some(session)
                if session.status == TransitionStatus::Preparing
                    && self.slots[aux].has_media() =>
            {
                session.cancel.clone()
            }
            _ => return Err(PlaybackError::NoPreparedMedia),
        };

        let ready_timeout = self.config.aux_ready_timeout();
        let outcome = self.slots[aux]
            .wait_until_ready(ready_timeout, &cancel)
            .await;
        if let Some(error) = wait_error(outcome, WaitStage::AuxiliaryReady, ready_timeout) {
            return Err(self.abort_transition(error).await);
        }

        if self.should_play {
            let master = self.master.index();
            if self.slots[master].state() == SlotState::Ready {
                debug!("Resuming idle master for overlap");
                if let Err(e) = self.slots[master].play().await {
                    warn!(error = %e, "Master resume failed");
                }
            }

            self.slots[aux].set_volume(0.0);
            if let Err(e) = self.slots[aux].play().await {
                return Err(self.abort_transition(PlaybackError::Load(e)).await);
            }

            let confirm_timeout = self.config.playing_confirm_timeout();
            let outcome = self.slots[aux]
                .wait_until_playing(confirm_timeout, &cancel)
                .await;
            if let Some(error) = wait_error(outcome, WaitStage::AuxiliaryPlaying, confirm_timeout)
            {
                return Err(self.abort_transition(error).await);
            }
        }

        let duration = settings.duration_with_floor(self.config.min_fade());
        let from = self.master_slot().loaded().map(|entry| entry.id.clone());
        let Some(session) = self.session.as_mut() else {
            return Err(PlaybackError::Cancelled);
        };
        session.start(settings);
        session.status = TransitionStatus::Overlapping;
        let to = session.incoming.id.clone();
        self.publish();

        info!(
            from = ?from,
            to = %to,
            duration_ms = duration.as_millis() as u64,
            "Transition overlapping"
        );
        self.emit(PlaybackEvent::TransitionStarted {
            from,
            to,
            duration_ms: duration.as_millis() as u64,
        });

        let focus_denied = self.swap();
        self.ticker.reset();
        if focus_denied {
            self.on_focus_denied().await;
        }

        Ok(self.master_slot().handle())
    }

    /// Flip roles without yielding
    ///
    /// Everything observable (timeline, focus owner, snapshot, listeners)
    /// moves to the incoming slot in one step. Returns whether the focus
    /// re-request under the new identity was denied.
    fn swap(&mut self) -> bool {
        let outgoing = self.master;
        let incoming = outgoing.other();
        let Some(entry) = self.session.as_ref().map(|session| session.incoming.clone()) else {
            return false;
        };

        // The queue being loaded belonged to the outgoing Master
        if let Some(load) = self.queue_load.take() {
            load.supersede();
        }

        let timeline = self.slots[outgoing.index()].timeline.plan_swap(&entry);
        self.slots[incoming.index()].timeline = timeline;
        self.slots[outgoing.index()].timeline = QueueTimeline::default();

        let handle = self.slots[incoming.index()].handle();
        let focus = self.focus.transfer(&handle, self.should_play);

        // A pending pause-at-end must not fire mid-fade
        for slot in &mut self.slots {
            slot.set_pause_at_end(false);
        }

        self.master = incoming;
        if let Some(session) = self.session.as_mut() {
            session.status = TransitionStatus::Swapped;
        }
        self.publish();

        info!(master = %incoming, media = ?handle.media_id, "Slots swapped");
        self.swap_listeners.notify(&handle);
        self.emit(PlaybackEvent::Swapped { master: handle });

        focus.is_some_and(|outcome| outcome.is_denied())
    }

    async fn on_tick(&mut self) {
        let tick = self.config.tick_interval();
        let floor = self.config.min_fade();
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let (incoming, outgoing) = session.advance(tick, floor);
        let complete = session.is_complete(floor);

        let master = self.master.index();
        let aux = self.aux_index();
        self.slots[master].set_volume(incoming);
        self.slots[aux].set_volume(outgoing);

        let ended = self.slots[master].state() == SlotState::Ended
            || self.slots[aux].state() == SlotState::Ended;
        if ended {
            debug!("Slot ended during fade, settling early");
        }
        if complete || ended {
            self.settle(TransitionStatus::NotRunning).await;
        }
    }

    async fn cancel_transition(&mut self) -> Result<()> {
        match self.session.as_ref().map(|session| session.status) {
            None => {}
            Some(status) if status.is_overlapping() => {
                self.settle(TransitionStatus::Cancelled).await;
            }
            Some(_) => {
                self.abort_transition(PlaybackError::Cancelled).await;
            }
        }
        Ok(())
    }

    /// Tear down the outgoing slot after the swap
    ///
    /// `outcome` is `NotRunning` for a finished fade and `Cancelled` when
    /// the fade was cut short.
    async fn settle(&mut self, outcome: TransitionStatus) {
        if let Some(session) = self.session.as_mut() {
            session.status = TransitionStatus::Settling;
            session.cancel.cancel();
        }
        self.publish();

        let master = self.master.index();
        let aux = self.aux_index();
        self.slots[aux].set_volume(0.0);
        self.slots[master].set_volume(1.0);

        if let Err(e) = self.slots[aux].stop_and_clear().await {
            debug!(error = %e, "Outgoing stop failed");
        }
        self.slots[aux].rebuild(self.factory.as_ref()).await;
        self.slots[master].set_pause_at_end(self.pause_at_end);

        self.finish_session(outcome);

        let handle = self.slots[master].handle();
        if outcome == TransitionStatus::Cancelled {
            info!(master = %handle.slot, "Transition cancelled after swap");
            self.emit(PlaybackEvent::TransitionCancelled);
        } else {
            info!(master = %handle.slot, media = ?handle.media_id, "Transition completed");
            self.emit(PlaybackEvent::TransitionCompleted { master: handle });
        }
    }

    /// Give up before the swap: Master back to full volume, Auxiliary cleared
    async fn abort_transition(&mut self, error: PlaybackError) -> PlaybackError {
        self.cancel_session_token();
        self.restore_master();
        self.reset_auxiliary().await;

        if error == PlaybackError::Cancelled {
            debug!("Transition cancelled before swap");
            self.finish_session(TransitionStatus::Cancelled);
            self.emit(PlaybackEvent::TransitionCancelled);
        } else {
            warn!(error = %error, "Transition aborted, master keeps playing");
            self.finish_session(TransitionStatus::NotRunning);
            self.emit(PlaybackEvent::TransitionAborted {
                reason: error.to_string(),
            });
        }
        error
    }

    /// Drop whatever session exists, the way a newer request would
    async fn discard_session(&mut self) {
        let Some(status) = self.session.as_ref().map(|session| session.status) else {
            return;
        };
        if status.is_overlapping() {
            self.settle(TransitionStatus::Cancelled).await;
        } else {
            self.abort_transition(PlaybackError::Cancelled).await;
        }
    }

    fn restore_master(&mut self) {
        self.master_slot().set_volume(1.0);
        for slot in &mut self.slots {
            slot.set_pause_at_end(false);
        }
    }

    fn drop_preparation(&mut self) {
        if let Some(load) = self.preparing.take() {
            load.supersede();
        }
    }

    async fn reset_auxiliary(&mut self) {
        let aux = self.aux_index();
        self.slots[aux].set_volume(0.0);
        if let Err(e) = self.slots[aux].stop_and_clear().await {
            debug!(error = %e, "Auxiliary stop failed");
        }
    }

    fn finish_session(&mut self, status: TransitionStatus) {
        self.drop_preparation();
        self.session = None;
        self.idle_status = status;
        self.publish();
    }

    // ===== Transport =====

    async fn set_queue(
        &mut self,
        entries: Vec<QueueEntry>,
        index: usize,
        start: Duration,
        reply: Reply<EngineHandle>,
    ) {
        self.discard_session().await;
        if let Some(previous) = self.queue_load.take() {
            previous.supersede();
        }

        let master = self.master.index();
        if self.master_failed {
            info!(slot = %self.master, "Rebuilding failed master engine");
            self.slots[master].rebuild(self.factory.as_ref()).await;
            self.master_failed = false;
        } else if let Err(e) = self.slots[master].stop_and_clear().await {
            debug!(error = %e, "Master stop failed");
        }

        let previous = self.slots[master].timeline().clone();
        let mut timeline = QueueTimeline::new(entries, index);
        timeline.set_repeat(previous.repeat());
        timeline.set_shuffle(previous.shuffle());
        self.slots[master].timeline = timeline;
        self.emit(PlaybackEvent::QueueChanged {
            length: self.slots[master].timeline().len(),
        });
        self.publish();

        let Some(entry) = self.slots[master].timeline().current_entry().cloned() else {
            let _ = reply.send(Ok(self.slots[master].handle()));
            return;
        };

        let resolver = Arc::clone(&self.resolver);
        let reference = entry.reference.clone();
        self.queue_load = Some(PendingLoad {
            entry,
            start,
            reply,
            resolving: Box::pin(async move { Some(resolver.resolve(&reference).await) }),
        });
    }

    async fn finish_queue_load(&mut self, load: PendingLoad, resolved: Resolution) {
        let PendingLoad {
            entry,
            start,
            reply,
            ..
        } = load;
        let result = self.load_master(entry, start, resolved).await;
        let _ = reply.send(result);
    }

    async fn load_master(
        &mut self,
        entry: QueueEntry,
        start: Duration,
        resolved: Resolution,
    ) -> Result<EngineHandle> {
        let locator = match resolved {
            Some(Ok(locator)) => locator,
            Some(Err(e)) => {
                warn!(media = %entry.id, error = %e, "Could not resolve queue entry");
                return Err(e.into());
            }
            None => return Err(PlaybackError::Cancelled),
        };

        let master = self.master.index();
        if let Err(e) = self.load_slot(master, entry, &locator, start).await {
            self.publish();
            return Err(e);
        }

        self.slots[master].set_volume(1.0);
        self.slots[master].set_pause_at_end(self.pause_at_end);
        if self.should_play {
            self.slots[master].play().await.map_err(transport_error)?;
        }

        self.publish();
        Ok(self.slots[master].handle())
    }

    async fn play(&mut self) -> Result<()> {
        self.ensure_master_alive()?;

        let handle = self.master_slot().handle();
        let outcome = self.focus.on_should_play(true, &handle);
        if outcome.is_some_and(|outcome| outcome.is_denied()) {
            self.on_focus_denied().await;
            return Err(PlaybackError::FocusDenied);
        }

        self.should_play = true;
        self.resume_slots(self.is_overlapping()).await?;
        self.publish();
        Ok(())
    }

    async fn pause(&mut self) -> Result<()> {
        let handle = self.master_slot().handle();
        self.should_play = false;
        self.focus.on_should_play(false, &handle);
        self.pause_slots().await;
        self.publish();
        Ok(())
    }

    async fn seek(&mut self, position: Duration) -> Result<()> {
        self.ensure_master_alive()?;
        self.master_slot()
            .seek(position)
            .await
            .map_err(transport_error)
    }

    async fn resume_slots(&mut self, auxiliary: bool) -> Result<()> {
        let master = self.master.index();
        if self.slots[master].has_media() {
            self.slots[master].play().await.map_err(transport_error)?;
        }
        if auxiliary {
            let aux = self.aux_index();
            if let Err(e) = self.slots[aux].play().await {
                warn!(error = %e, "Auxiliary resume failed");
            }
            // Fade clock restarts a full tick after resume
            self.ticker.reset();
        }
        Ok(())
    }

    async fn pause_slots(&mut self) {
        let overlapping = self.is_overlapping();
        let master = self.master.index();
        if let Err(e) = self.slots[master].pause().await {
            debug!(error = %e, "Master pause failed");
        }
        if overlapping {
            let aux = self.aux_index();
            if let Err(e) = self.slots[aux].pause().await {
                debug!(error = %e, "Auxiliary pause failed");
            }
        }
    }

    // ===== Focus =====

    async fn on_focus_change(&mut self, change: FocusChange) {
        if change == FocusChange::LossTransient && !self.should_play {
            // Already paused by the user; nothing to resume later
            return;
        }

        let overlapping = self.is_overlapping();
        match self.focus.on_change(change, overlapping) {
            FocusDirective::None => {}
            FocusDirective::StopAll => {
                self.should_play = false;
                self.pause_slots().await;
                self.publish();
                self.emit(PlaybackEvent::FocusLost);
            }
            FocusDirective::PauseAll => {
                // Volumes stay where they are and the fade clock stops
                self.should_play = false;
                self.pause_slots().await;
                self.publish();
                self.emit(PlaybackEvent::FocusPaused);
            }
            FocusDirective::Resume { auxiliary } => {
                self.should_play = true;
                if let Err(e) = self.resume_slots(auxiliary).await {
                    warn!(error = %e, "Resume after focus gain failed");
                }
                self.publish();
                self.emit(PlaybackEvent::FocusResumed { auxiliary });
            }
        }
    }

    async fn on_focus_denied(&mut self) {
        warn!("Audio focus denied, pausing");
        self.should_play = false;
        self.pause_slots().await;
        self.publish();
        self.emit(PlaybackEvent::FocusDenied);
    }

    // ===== Master lifecycle =====

    async fn on_master_state(&mut self, state: SlotState) {
        match state {
            SlotState::Failed => self.on_master_failed("engine reported failure").await,
            SlotState::Ended if !self.is_overlapping() => {
                let media_id = self.master_slot().loaded().map(|entry| entry.id.clone());
                debug!(media = ?media_id, "Master reached end of media");
                self.emit(PlaybackEvent::MediaEnded { media_id });
            }
            _ => {}
        }
    }

    async fn on_master_failed(&mut self, message: &str) {
        let master = self.master_slot().handle();
        error!(slot = %master.slot, media = ?master.media_id, reason = message, "Master engine failed");

        self.master_failed = true;
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
        self.drop_preparation();
        if let Some(load) = self.queue_load.take() {
            load.supersede();
        }
        self.reset_auxiliary().await;

        self.should_play = false;
        self.focus.on_should_play(false, &master);
        self.idle_status = TransitionStatus::Failed;
        self.publish();

        self.emit(PlaybackEvent::MasterFailed {
            master,
            message: message.to_string(),
        });
    }

    fn ensure_master_alive(&self) -> Result<()> {
        if self.master_failed {
            return Err(PlaybackError::EngineFatal(
                "master engine failed; load new media to recover".to_string(),
            ));
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        info!("Orchestrator shutting down");
        self.discard_session().await;
        self.queue_load = None;
        self.focus.abandon();
        for slot in &mut self.slots {
            slot.release().await;
        }
    }

    // ===== Helpers =====

    fn aux_index(&self) -> usize {
        self.master.other().index()
    }

    fn master_slot(&mut self) -> &mut PlaybackSlot {
        &mut self.slots[self.master.index()]
    }

    fn is_overlapping(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.status.is_overlapping())
    }

    fn is_fading(&self) -> bool {
        self.should_play
            && !self.focus.is_paused_by_focus_loss()
            && self
                .session
                .as_ref()
                .is_some_and(|session| session.status == TransitionStatus::Swapped)
    }

    /// Queue entry for a reference, keeping queue metadata when the Master
    /// timeline already knows it
    fn entry_for(&self, reference: &MediaReference) -> QueueEntry {
        let id = reference.media_id();
        let timeline = self.slots[self.master.index()].timeline();
        timeline
            .upcoming()
            .iter()
            .chain(timeline.entries())
            .find(|entry| entry.id == id)
            .cloned()
            .unwrap_or_else(|| QueueEntry::from_reference(reference.clone()))
    }

    fn new_cancel_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self
            .active_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    fn cancel_session_token(&self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }

    fn transition_status(&self) -> TransitionStatus {
        self.session
            .as_ref()
            .map_or(self.idle_status, |session| session.status)
    }

    fn publish(&self) {
        let master = self.master.index();
        self.snapshot.send_replace(EngineSnapshot {
            master: self.slots[master].handle(),
            auxiliary: self.slots[self.aux_index()].handle(),
            transition: self.transition_status(),
            should_play: self.should_play,
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Wait for a pending resolution and hand it over once it completes
///
/// Returns `None` right away when nothing is pending.
async fn resolution(pending: &mut Option<PendingLoad>) -> Option<(PendingLoad, Resolution)> {
    let resolved = match pending.as_mut() {
        Some(load) => load.resolving.as_mut().await,
        None => return None,
    };
    pending.take().map(|load| (load, resolved))
}

/// Run `future` unless `cancel` fires first
async fn until_cancelled<F: Future>(cancel: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        output = future => Some(output),
    }
}

fn wait_error(outcome: WaitOutcome, stage: WaitStage, waited: Duration) -> Option<PlaybackError> {
    match outcome {
        WaitOutcome::Reached => None,
        WaitOutcome::TimedOut => Some(PlaybackError::ReadinessTimeout { stage, waited }),
        WaitOutcome::Cancelled => Some(PlaybackError::Cancelled),
        WaitOutcome::Failed => Some(PlaybackError::Load(EngineError::Unplayable(
            "auxiliary engine failed".to_string(),
        ))),
    }
}

fn transport_error(error: EngineError) -> PlaybackError {
    match error {
        EngineError::Fatal(message) => PlaybackError::EngineFatal(message),
        other => PlaybackError::InvalidOperation(other.to_string()),
    }
}
