//! SyncEngine: keeps the peripheral's display in step with the desktop.
//!
//! The engine owns the serial transport and the *shadow state*: what it
//! believes the peripheral currently shows.  Callers ask for a target state;
//! the engine plans the minimal byte sequence from the shadow to the target,
//! sends it byte by byte, and advances the shadow after every successful write.
//!
//! # Concurrency
//!
//! - All writes and every shadow mutation happen under one async mutex (the
//!   reconciliation lock), held for a whole pass.
//! - The serial reader thread never takes that lock.  It feeds an inbound pump
//!   task, which decodes bytes and queues intents for a single long-lived
//!   intent worker.  The worker calls the registered [`IntentHandler`] outside
//!   the lock, so a handler may call straight back into the engine.
//! - Link state is published on a watch channel, so [`SyncEngine::is_connected`]
//!   never waits for an in-flight pass.

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use deckbridge_core::{
    decode_all, encode_command, plan_reconciliation, plan_track_change, InboundEvent,
    OutboundCommand, ShadowState, TrackDirection, TrackState,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::infrastructure::serial::{
    InboundStream, LinkSettings, LinkState, SerialDriver, SerialTransport, TransportError,
    TransportEvent, LOST_CONNECTION_STATUS,
};

// ── Settings ──────────────────────────────────────────────────────────────────

/// Extra gaps the engine leaves on top of the transport's inter-byte minimum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTiming {
    /// Gap after every `T`, `D`, `C` or `V`.
    pub counter_gap: Duration,
    /// Gap after `N` or `B`, before the play-state byte.
    pub shortcut_gap: Duration,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            counter_gap: Duration::from_millis(20),
            shortcut_gap: Duration::from_millis(50),
        }
    }
}

// ── Errors and events ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SyncError {
    /// `true` when the request failed only because no link is open.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, SyncError::Transport(TransportError::NotConnected))
    }
}

/// Notifications published by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Human-readable status line.
    Status(String),
    ConnectionChanged(LinkState),
}

// ── Intent handler ────────────────────────────────────────────────────────────

/// Receives user intents from the peripheral's buttons.
///
/// Every method defaults to a no-op, so a handler only implements the intents
/// it cares about.  The engine holds the handler weakly; once the owner drops
/// it, intents are discarded.
#[async_trait]
pub trait IntentHandler: Send + Sync {
    async fn on_play(&self) {}
    async fn on_pause(&self) {}
    async fn on_next(&self) {}
    async fn on_prev(&self) {}
    async fn on_seek_relative(&self, _delta_secs: i32) {}
    async fn on_status_request(&self) {}
}

type HandlerSlot = Arc<RwLock<Option<Weak<dyn IntentHandler>>>>;

// ── SyncEngine ────────────────────────────────────────────────────────────────

/// State guarded by the reconciliation lock.
struct LinkCore {
    transport: SerialTransport,
    shadow: ShadowState,
}

impl LinkCore {
    /// Sends one command and applies its shadow effect once the write succeeded.
    async fn send(&mut self, command: OutboundCommand) -> Result<(), TransportError> {
        let byte = encode_command(command);
        self.transport.write(byte).await?;
        self.shadow.apply(command);
        debug!(
            byte = %char::from(byte),
            meaning = command.describe(),
            shadow = %self.shadow,
            "sent"
        );
        Ok(())
    }
}

pub struct SyncEngine {
    core: Mutex<LinkCore>,
    driver: Arc<dyn SerialDriver>,
    link_state: watch::Receiver<LinkState>,
    timing: SyncTiming,
    handler: HandlerSlot,
    intents: mpsc::UnboundedSender<InboundEvent>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Creates a disconnected engine and returns it together with its event
    /// receiver.
    ///
    /// Must be called from within a Tokio runtime: the link monitor and the
    /// intent worker are spawned here.
    pub fn new(
        driver: Arc<dyn SerialDriver>,
        link: LinkSettings,
        timing: SyncTiming,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (transport, transitions) = SerialTransport::new(Arc::clone(&driver), link);
        let link_state = transport.subscribe();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (intents_tx, intents_rx) = mpsc::unbounded_channel();
        let handler: HandlerSlot = Arc::new(RwLock::new(None));

        tokio::spawn(run_link_monitor(transitions, events_tx));
        tokio::spawn(run_intent_worker(intents_rx, Arc::clone(&handler)));

        let engine = Arc::new(Self {
            core: Mutex::new(LinkCore {
                transport,
                shadow: ShadowState::ORIGIN,
            }),
            driver,
            link_state,
            timing,
            handler,
            intents: intents_tx,
            pump: StdMutex::new(None),
        });
        (engine, events_rx)
    }

    // ── Connection ───────────────────────────────────────────────────────────

    pub fn list_ports(&self) -> Vec<String> {
        self.driver.list_ports()
    }

    pub fn is_connected(&self) -> bool {
        self.link_state.borrow().is_open()
    }

    pub fn link_state(&self) -> LinkState {
        self.link_state.borrow().clone()
    }

    /// Opens `port`, resets the shadow and starts dispatching inbound bytes.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PortUnavailable`] (wrapped) if the port cannot
    /// be opened.  Any previous connection is closed either way.
    pub async fn connect(&self, port: &str) -> Result<(), SyncError> {
        let mut core = self.core.lock().await;
        self.stop_pump();
        let inbound = core.transport.open(port)?;
        core.shadow = ShadowState::ORIGIN;
        drop(core);

        self.start_pump(inbound);
        Ok(())
    }

    /// Closes the link.  Idempotent.
    pub async fn disconnect(&self) {
        let mut core = self.core.lock().await;
        core.transport.close();
        drop(core);
        self.stop_pump();
    }

    /// Resets the shadow to the peripheral's power-on state.
    pub async fn on_connected(&self) {
        self.reset_shadow().await;
    }

    /// Forgets what was sent, without touching the link.
    pub async fn reset_shadow(&self) {
        let mut core = self.core.lock().await;
        core.shadow = ShadowState::ORIGIN;
        debug!("shadow reset to origin");
    }

    pub async fn shadow(&self) -> ShadowState {
        self.core.lock().await.shadow
    }

    pub fn set_intent_handler(&self, handler: Weak<dyn IntentHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    /// Drives the shadow to `target`.
    ///
    /// Sends nothing when the shadow already matches.  A write failure aborts
    /// the pass with the shadow advanced as far as the bytes that went out.
    ///
    /// # Errors
    ///
    /// Fails without sending anything when the link is not open, and with the
    /// transport error of the first failed write otherwise.
    pub async fn request_target_state(&self, target: TrackState) -> Result<(), SyncError> {
        let mut core = self.core.lock().await;
        core.transport.ensure_open()?;

        let plan = plan_reconciliation(&core.shadow, &target);
        if plan.is_empty() {
            return Ok(());
        }
        debug!(from = %core.shadow, to = ?target, bytes = plan.len(), "reconciling");
        for command in plan.iter() {
            core.send(command).await?;
            if command.is_counter_bump() {
                tokio::time::sleep(self.timing.counter_gap).await;
            }
        }
        Ok(())
    }

    /// Sends the one-byte track-change shortcut, then aligns the play flag.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::request_target_state`].
    pub async fn request_track_change(
        &self,
        direction: TrackDirection,
        playing_after: bool,
    ) -> Result<(), SyncError> {
        let mut core = self.core.lock().await;
        core.transport.ensure_open()?;

        let plan = plan_track_change(&core.shadow, direction, playing_after);
        for command in plan.iter() {
            core.send(command).await?;
            if command.is_track_shortcut() {
                tokio::time::sleep(self.timing.shortcut_gap).await;
            }
        }
        Ok(())
    }

    /// Sends one beat pulse.  Dropped silently while not connected.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write itself fails.
    pub async fn emit_beat(&self) -> Result<(), SyncError> {
        let mut core = self.core.lock().await;
        if !core.transport.is_open() {
            return Ok(());
        }
        core.send(OutboundCommand::Beat).await?;
        Ok(())
    }

    // ── Inbound pump ─────────────────────────────────────────────────────────

    fn start_pump(&self, inbound: InboundStream) {
        let task = tokio::spawn(run_inbound_pump(inbound, self.intents.clone()));
        if let Some(old) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task)
        {
            old.abort();
        }
    }

    fn stop_pump(&self) {
        if let Some(task) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

// ── Background tasks ──────────────────────────────────────────────────────────

/// Decodes inbound chunks and queues intents, in arrival order.
async fn run_inbound_pump(
    mut inbound: InboundStream,
    intents: mpsc::UnboundedSender<InboundEvent>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            TransportEvent::Bytes(chunk) => {
                for intent in decode_all(&chunk) {
                    if let InboundEvent::Unknown(byte) = intent {
                        debug!(byte = %format_args!("{byte:#04x}"), "ignoring unknown inbound byte");
                        continue;
                    }
                    debug!(byte = %char::from(intent.to_byte()), ?intent, "received");
                    if intents.send(intent).is_err() {
                        return;
                    }
                }
            }
            TransportEvent::ReadFailed(reason) => {
                debug!(%reason, "inbound stream ended");
                break;
            }
        }
    }
}

/// Invokes the registered handler for each queued intent, one at a time.
async fn run_intent_worker(
    mut intents: mpsc::UnboundedReceiver<InboundEvent>,
    slot: HandlerSlot,
) {
    while let Some(intent) = intents.recv().await {
        let handler = slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade);
        let Some(handler) = handler else {
            debug!(?intent, "no intent handler registered; dropping");
            continue;
        };
        match intent {
            InboundEvent::Play => handler.on_play().await,
            InboundEvent::Pause => handler.on_pause().await,
            InboundEvent::NextTrack => handler.on_next().await,
            InboundEvent::PrevTrack => handler.on_prev().await,
            InboundEvent::SeekRelative(delta) => handler.on_seek_relative(delta).await,
            InboundEvent::StatusRequest => handler.on_status_request().await,
            InboundEvent::Unknown(_) => {}
        }
    }
}

/// Turns link transitions into status lines and connection events.
async fn run_link_monitor(
    mut transitions: mpsc::UnboundedReceiver<LinkState>,
    events: mpsc::UnboundedSender<EngineEvent>,
) {
    while let Some(state) = transitions.recv().await {
        let status = match &state {
            LinkState::Open { port } => {
                info!(port = %port, "peripheral connected");
                format!("Connected to {port}")
            }
            LinkState::Closed => {
                info!("peripheral disconnected");
                "Disconnected".to_string()
            }
            LinkState::Lost { reason } => {
                warn!(%reason, "peripheral link lost");
                LOST_CONNECTION_STATUS.to_string()
            }
        };
        if events.send(EngineEvent::Status(status)).is_err() {
            break;
        }
        let _ = events.send(EngineEvent::ConnectionChanged(state));
    }
}
