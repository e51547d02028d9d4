//! ControllerMediator: glue between the media engine, the sync engine and the UI.
//!
//! The mediator holds no playback state of its own.  After every media engine
//! call it reads the engine back, publishes what changed to the UI, and asks
//! the sync engine to bring the peripheral in line.  In the other direction it
//! is the sync engine's [`IntentHandler`]: button presses on the peripheral
//! become media engine calls, which loop back through the same path.
//!
//! # Serialization
//!
//! The media engine lives inside an async mutex (the *ops lock*).  UI
//! commands, peripheral intents and timer ticks all take it for the whole
//! operation, including the resulting sync request.  Two operations can
//! therefore never interleave between "change the playlist" and "tell the
//! peripheral about it".

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use async_trait::async_trait;
use deckbridge_core::{PlaybackState, ShadowState, TrackDirection, TrackState};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::application::media::{MediaEngine, MediaEvent};
use crate::application::sync_engine::{EngineEvent, IntentHandler, SyncEngine, SyncError};
use crate::application::timers::{beat_interval, PeriodicTask, TimerSet, CLOCK_PERIOD};
use crate::infrastructure::serial::{LinkState, TransportError};

// ── Settings ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediatorSettings {
    /// Tempo of the beat pulse sent while playing.
    pub bpm: u32,
    pub beat_enabled: bool,
    /// Publish [`UiEvent::TimeSync`] once per second while playing.
    pub time_sync_enabled: bool,
}

impl Default for MediatorSettings {
    fn default() -> Self {
        Self {
            bpm: 120,
            beat_enabled: true,
            time_sync_enabled: true,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MediatorError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("no track at position {index} (playlist has {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("no serial port selected")]
    NoPortSelected,
}

// ── UI events ─────────────────────────────────────────────────────────────────

/// Everything a front-end needs to render.
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Status(String),
    Connection(bool),
    Playlist {
        names: Vec<String>,
        current: Option<usize>,
    },
    /// `number` is 1-based; all fields are empty/zero for an empty playlist.
    TrackInfo {
        name: String,
        number: usize,
        total: usize,
    },
    PlayState(bool),
    Time {
        position: f64,
        duration: f64,
    },
    /// Whole seconds of playback position, pushed once per second while playing.
    TimeSync(u64),
    Volume(u8),
    /// Seek bar position in percent.
    SeekPosition(u8),
}

/// Point-in-time view for the console's `status` command.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub link: LinkState,
    pub shadow: ShadowState,
    pub playback: Option<PlaybackState>,
    pub track_name: Option<String>,
    pub position: f64,
    pub duration: f64,
    pub volume: u8,
}

// ── Echo guard ────────────────────────────────────────────────────────────────

/// Remembers the last value pushed to a view control.
///
/// A view that forwards its control's changes back to the mediator would
/// otherwise turn every model update into a user request.  The UI channel is
/// asynchronous, so the echo can arrive long after the publish; matching on
/// the value rather than on a window of time catches it whenever it comes.
#[derive(Debug)]
struct EchoGuard(AtomicU16);

impl EchoGuard {
    const NONE: u16 = u16::MAX;

    fn published(&self, value: u8) {
        self.0.store(u16::from(value), Ordering::Release);
    }

    fn is_echo(&self, value: u8) -> bool {
        self.0.load(Ordering::Acquire) == u16::from(value)
    }
}

impl Default for EchoGuard {
    fn default() -> Self {
        Self(AtomicU16::new(Self::NONE))
    }
}

// ── ControllerMediator ────────────────────────────────────────────────────────

pub struct ControllerMediator {
    /// The ops lock.
    media: Mutex<Box<dyn MediaEngine>>,
    sync: Arc<SyncEngine>,
    ui: mpsc::UnboundedSender<UiEvent>,
    settings: MediatorSettings,
    timers: StdMutex<TimerSet>,
    seek_echo: EchoGuard,
    volume_echo: EchoGuard,
    me: Weak<ControllerMediator>,
}

impl ControllerMediator {
    /// Creates the mediator, registers it as the engine's intent handler and
    /// starts forwarding engine events.  Returns the UI event receiver.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        media: Box<dyn MediaEngine>,
        sync: Arc<SyncEngine>,
        engine_events: mpsc::UnboundedReceiver<EngineEvent>,
        settings: MediatorSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<UiEvent>) {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let mediator = Arc::new_cyclic(|me| Self {
            media: Mutex::new(media),
            sync,
            ui: ui_tx.clone(),
            settings,
            timers: StdMutex::new(TimerSet::default()),
            seek_echo: EchoGuard::default(),
            volume_echo: EchoGuard::default(),
            me: me.clone(),
        });

        let handler: Weak<dyn IntentHandler> = Arc::downgrade(&mediator) as Weak<dyn IntentHandler>;
        mediator.sync.set_intent_handler(handler);
        tokio::spawn(run_engine_events(engine_events, ui_tx));

        (mediator, ui_rx)
    }

    // ── Connection surface ───────────────────────────────────────────────────

    pub fn list_ports(&self) -> Vec<String> {
        self.sync.list_ports()
    }

    pub fn is_connected(&self) -> bool {
        self.sync.is_connected()
    }

    /// Connects to `port` and sends the full current state.
    ///
    /// # Errors
    ///
    /// [`MediatorError::NoPortSelected`] for a blank name, or the sync error
    /// if the port cannot be opened.  Both are also published as a status line
    /// together with `Connection(false)`.
    pub async fn connect(&self, port: &str) -> Result<(), MediatorError> {
        let port = port.trim();
        if port.is_empty() {
            self.publish(UiEvent::Status("No serial port selected".to_string()));
            self.publish(UiEvent::Connection(false));
            return Err(MediatorError::NoPortSelected);
        }

        let media = self.media.lock().await;
        if let Err(e) = self.sync.connect(port).await {
            let reason = match &e {
                SyncError::Transport(TransportError::PortUnavailable { reason, .. }) => {
                    reason.clone()
                }
                other => other.to_string(),
            };
            warn!(port, %reason, "connect failed");
            self.publish(UiEvent::Status(format!("Failed to connect to {port}: {reason}")));
            self.publish(UiEvent::Connection(false));
            return Err(e.into());
        }

        // The peripheral has just reset to 1/1 paused; bring it up to date.
        if let Some(target) = self.current_target(&**media) {
            self.push_state(target).await;
        }
        Ok(())
    }

    /// Pauses playback (sending `S`) and closes the link.
    pub async fn disconnect(&self) {
        let mut media = self.media.lock().await;
        if media.is_playing() {
            let events = media.pause();
            self.apply(&mut **media, events).await;
        }
        self.sync.disconnect().await;
    }

    /// Disconnects and stops every timer.
    pub async fn shutdown(&self) {
        self.disconnect().await;
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop_all();
        info!("mediator shut down");
    }

    // ── Playlist surface ─────────────────────────────────────────────────────

    /// Enqueues `paths`.  Returns how many were accepted.
    pub async fn add_tracks(&self, paths: Vec<PathBuf>) -> usize {
        let mut media = self.media.lock().await;
        let before = media.track_count();
        let events = media.add_tracks(paths);
        self.apply(&mut **media, events).await;
        let added = media.track_count().saturating_sub(before);
        info!(added, total = media.track_count(), "tracks added");
        added
    }

    /// Removes the track at 0-based `index`.
    ///
    /// # Errors
    ///
    /// [`MediatorError::InvalidIndex`] if there is no such track.
    pub async fn remove_track(&self, index: usize) -> Result<(), MediatorError> {
        let mut media = self.media.lock().await;
        self.check_index(&**media, index)?;
        let events = media.remove_track(index);
        self.apply(&mut **media, events).await;
        Ok(())
    }

    pub async fn clear_playlist(&self) {
        let mut media = self.media.lock().await;
        let events = media.clear();
        self.apply(&mut **media, events).await;
    }

    /// Makes the track at 0-based `index` current.
    ///
    /// # Errors
    ///
    /// [`MediatorError::InvalidIndex`] if there is no such track.
    pub async fn select_track(&self, index: usize) -> Result<(), MediatorError> {
        let mut media = self.media.lock().await;
        self.check_index(&**media, index)?;
        let events = media.select(index);
        self.apply(&mut **media, events).await;
        Ok(())
    }

    // ── Transport surface ────────────────────────────────────────────────────

    pub async fn play(&self) {
        let mut media = self.media.lock().await;
        if media.track_count() == 0 {
            self.publish(UiEvent::Status("Playlist is empty".to_string()));
            return;
        }
        let events = media.play();
        self.apply(&mut **media, events).await;
    }

    pub async fn pause(&self) {
        let mut media = self.media.lock().await;
        let events = media.pause();
        self.apply(&mut **media, events).await;
    }

    pub async fn next_track(&self) {
        self.step_track(TrackDirection::Next).await;
    }

    pub async fn prev_track(&self) {
        self.step_track(TrackDirection::Prev).await;
    }

    /// Seeks to `percent` of the current track.  Ignored when `percent` is
    /// the seek bar position last published from playback.
    pub async fn seek_percent(&self, percent: u8) {
        if self.seek_echo.is_echo(percent) {
            debug!(percent, "seek bar echo ignored");
            return;
        }
        let mut media = self.media.lock().await;
        let events = media.seek_percent(percent.min(100));
        self.apply(&mut **media, events).await;
    }

    /// Sets the volume.  Ignored when `volume` is the value last published
    /// from the engine.
    pub async fn set_volume(&self, volume: u8) {
        if self.volume_echo.is_echo(volume) {
            debug!(volume, "volume echo ignored");
            return;
        }
        let mut media = self.media.lock().await;
        let events = media.set_volume(volume);
        self.apply(&mut **media, events).await;
    }

    pub async fn status(&self) -> StatusSnapshot {
        let shadow = self.sync.shadow().await;
        let media = self.media.lock().await;
        let playback = self.playback_state(&**media);
        let track_name = media
            .current_index()
            .and_then(|i| media.track_names().get(i).cloned());
        StatusSnapshot {
            link: self.sync.link_state(),
            shadow,
            playback,
            track_name,
            position: media.position_secs(),
            duration: media.duration_secs(),
            volume: media.volume(),
        }
    }

    /// One playback clock tick: advance the engine, push time sync, handle track end.
    pub async fn on_clock_tick(&self) {
        let mut media = self.media.lock().await;
        let before = media.current_index();
        let events = media.tick();
        if self.settings.time_sync_enabled && media.is_playing() {
            self.publish(UiEvent::TimeSync(media.position_secs().max(0.0) as u64));
        }
        // End of track advances like the "next" button.
        self.echo_step(&mut **media, TrackDirection::Next, before, events)
            .await;
    }

    // ── Internals ────────────────────────────────────────────────────────────

    /// Moves one track and echoes it to the peripheral.
    async fn step_track(&self, direction: TrackDirection) {
        let mut media = self.media.lock().await;
        let before = media.current_index();
        let events = match direction {
            TrackDirection::Next => media.next_track(),
            TrackDirection::Prev => media.previous_track(),
        };
        self.echo_step(&mut **media, direction, before, events).await;
    }

    /// Echoes a track step with the `N`/`B` shortcut if the index moved, and
    /// reconciles normally otherwise.
    async fn echo_step(
        &self,
        media: &mut dyn MediaEngine,
        direction: TrackDirection,
        before: Option<usize>,
        events: Vec<MediaEvent>,
    ) {
        let after = media.current_index();
        if after.is_none() || before == after {
            // Rewind-to-start, progress only, or an empty playlist.
            self.apply(media, events).await;
            return;
        }

        self.publish_events(media, &events);
        if let Err(e) = self
            .sync
            .request_track_change(direction, media.is_playing())
            .await
        {
            self.report_sync_error(&e);
            return;
        }
        // Normally a no-op; closes any gap the shortcut alone cannot.
        if let Some(target) = self.current_target(media) {
            self.push_state(target).await;
        }
    }

    /// Publishes `events` and reconciles the peripheral once for all of them.
    async fn apply(&self, media: &mut dyn MediaEngine, events: Vec<MediaEvent>) {
        if events.is_empty() {
            return;
        }
        self.publish_events(media, &events);

        if events.iter().any(|e| matches!(e, MediaEvent::PlaylistCleared)) {
            self.sync.reset_shadow().await;
            self.push_state(TrackState::ORIGIN).await;
        } else if events.iter().any(MediaEvent::affects_peripheral) {
            if let Some(target) = self.current_target(media) {
                self.push_state(target).await;
            }
        }
    }

    /// Renders media events for the UI and starts/stops the playback timers.
    fn publish_events(&self, media: &dyn MediaEngine, events: &[MediaEvent]) {
        for event in events {
            match event {
                MediaEvent::TracksChanged => {
                    self.publish_playlist(media);
                    self.publish_track_info(media);
                }
                MediaEvent::TrackChanged(_) => {
                    self.publish_playlist(media);
                    self.publish_track_info(media);
                    self.publish_time(media);
                }
                MediaEvent::PlayStateChanged(playing) => {
                    self.publish(UiEvent::PlayState(*playing));
                    self.set_timers(*playing);
                }
                MediaEvent::PositionChanged(_) | MediaEvent::Progress(_) => {
                    self.publish_time(media);
                }
                MediaEvent::VolumeChanged(volume) => {
                    self.volume_echo.published(*volume);
                    self.publish(UiEvent::Volume(*volume));
                }
                MediaEvent::PlaylistCleared => {
                    self.publish(UiEvent::Playlist {
                        names: Vec::new(),
                        current: None,
                    });
                    self.publish_track_info(media);
                    self.publish(UiEvent::Time {
                        position: 0.0,
                        duration: 0.0,
                    });
                }
                MediaEvent::LoadFailed { index, reason } => {
                    warn!(track = index + 1, %reason, "track failed to load; skipped");
                    self.publish(UiEvent::Status(format!(
                        "Cannot play track {}: {reason}",
                        index + 1
                    )));
                }
                MediaEvent::Rejected { path, reason } => {
                    warn!(path = %path.display(), %reason, "file not added");
                    self.publish(UiEvent::Status(format!(
                        "Skipped {}: {reason}",
                        path.display()
                    )));
                }
            }
        }
    }

    fn publish_playlist(&self, media: &dyn MediaEngine) {
        self.publish(UiEvent::Playlist {
            names: media.track_names(),
            current: media.current_index(),
        });
    }

    fn publish_track_info(&self, media: &dyn MediaEngine) {
        let total = media.track_count();
        let (name, number) = match media.current_index() {
            Some(i) => (media.track_names().get(i).cloned().unwrap_or_default(), i + 1),
            None => (String::new(), 0),
        };
        self.publish(UiEvent::TrackInfo {
            name,
            number,
            total,
        });
    }

    fn publish_time(&self, media: &dyn MediaEngine) {
        let position = media.position_secs();
        let duration = media.duration_secs();
        self.publish(UiEvent::Time { position, duration });

        let percent = if duration > 0.0 {
            ((position / duration) * 100.0).clamp(0.0, 100.0) as u8
        } else {
            0
        };
        self.seek_echo.published(percent);
        self.publish(UiEvent::SeekPosition(percent));
    }

    fn publish(&self, event: UiEvent) {
        let _ = self.ui.send(event);
    }

    fn playback_state(&self, media: &dyn MediaEngine) -> Option<PlaybackState> {
        match PlaybackState::from_media(
            media.current_index(),
            media.track_count(),
            media.is_playing(),
        ) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(error = %e, "playback state cannot be mirrored");
                None
            }
        }
    }

    /// What the peripheral should show for the engine's current state.
    fn current_target(&self, media: &dyn MediaEngine) -> Option<TrackState> {
        self.playback_state(media).map(|state| state.target())
    }

    async fn push_state(&self, target: TrackState) {
        if let Err(e) = self.sync.request_target_state(target).await {
            self.report_sync_error(&e);
        }
    }

    fn report_sync_error(&self, error: &SyncError) {
        if error.is_not_connected() {
            debug!("peripheral not connected; state not mirrored");
        } else {
            // Link loss is announced by the engine's own status event.
            warn!(error = %error, "peripheral sync failed");
        }
    }

    fn check_index(&self, media: &dyn MediaEngine, index: usize) -> Result<(), MediatorError> {
        let len = media.track_count();
        if index >= len {
            let error = MediatorError::InvalidIndex { index: index + 1, len };
            self.publish(UiEvent::Status(error.to_string()));
            return Err(error);
        }
        Ok(())
    }

    fn set_timers(&self, playing: bool) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if !playing {
            timers.stop_all();
            return;
        }
        if timers.is_running() {
            return;
        }

        let mut tasks = Vec::new();
        if self.settings.beat_enabled {
            if let Some(period) = beat_interval(self.settings.bpm) {
                let sync = Arc::clone(&self.sync);
                tasks.push(PeriodicTask::spawn("beat", period, move || {
                    let sync = Arc::clone(&sync);
                    async move {
                        if let Err(e) = sync.emit_beat().await {
                            debug!(error = %e, "beat not sent");
                        }
                        ControlFlow::Continue(())
                    }
                }));
            }
        }

        let me = self.me.clone();
        tasks.push(PeriodicTask::spawn("clock", CLOCK_PERIOD, move || {
            let me = me.clone();
            async move {
                match me.upgrade() {
                    Some(mediator) => {
                        mediator.on_clock_tick().await;
                        ControlFlow::Continue(())
                    }
                    None => ControlFlow::Break(()),
                }
            }
        }));
        timers.replace(tasks);
    }

    #[cfg(test)]
    fn running_timers(&self) -> Vec<&'static str> {
        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names()
    }
}

#[async_trait]
impl IntentHandler for ControllerMediator {
    async fn on_play(&self) {
        self.play().await;
    }

    async fn on_pause(&self) {
        self.pause().await;
    }

    async fn on_next(&self) {
        self.step_track(TrackDirection::Next).await;
    }

    async fn on_prev(&self) {
        self.step_track(TrackDirection::Prev).await;
    }

    async fn on_seek_relative(&self, delta_secs: i32) {
        let mut media = self.media.lock().await;
        let events = media.seek_relative(delta_secs);
        self.apply(&mut **media, events).await;
    }

    async fn on_status_request(&self) {
        let media = self.media.lock().await;
        if let Some(target) = self.current_target(&**media) {
            self.push_state(target).await;
        }
    }
}

/// Forwards engine notifications to the UI.
async fn run_engine_events(
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ui: mpsc::UnboundedSender<UiEvent>,
) {
    while let Some(event) = events.recv().await {
        let forwarded = match event {
            EngineEvent::Status(text) => UiEvent::Status(text),
            EngineEvent::ConnectionChanged(state) => UiEvent::Connection(state.is_open()),
        };
        if ui.send(forwarded).is_err() {
            break;
        }
    }
}
