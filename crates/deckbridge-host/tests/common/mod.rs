//! Shared fixtures for the host integration tests.
//!
//! [`SimulatedPeripheral`] applies received bytes the way the control deck's
//! firmware does, so a test can replay what the mock driver recorded and check
//! what the physical display would show.

#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deckbridge_core::TrackState;
use deckbridge_host::application::mediator::{ControllerMediator, MediatorSettings, UiEvent};
use deckbridge_host::application::sync_engine::{EngineEvent, SyncEngine, SyncTiming};
use deckbridge_host::infrastructure::media::{PlayerSettings, PlaylistPlayer};
use deckbridge_host::infrastructure::serial::mock::MockSerialDriver;
use deckbridge_host::infrastructure::serial::LinkSettings;
use tokio::sync::mpsc;

pub const PORT: &str = "ttyACM0";

// ── Simulated firmware ────────────────────────────────────────────────────────

/// The peripheral's display model: counters start at 1/1, paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedPeripheral {
    pub current: u16,
    pub total: u16,
    pub playing: bool,
    pub beats: usize,
}

impl SimulatedPeripheral {
    pub fn power_on() -> Self {
        Self {
            current: 1,
            total: 1,
            playing: false,
            beats: 0,
        }
    }

    /// Applies one received byte.  Returns the byte the firmware sends back,
    /// if any.
    pub fn receive(&mut self, byte: u8) -> Option<u8> {
        match byte {
            b'P' => self.playing = true,
            b'S' => self.playing = false,
            b'T' => self.total = (self.total + 1).min(99),
            b'D' => {
                if self.total > 1 {
                    self.total -= 1;
                    self.current = self.current.min(self.total);
                }
            }
            b'C' => self.step_forward(),
            b'V' => self.step_back(),
            b'N' => {
                self.step_forward();
                return Some(b'Q');
            }
            b'B' => {
                self.step_back();
                return Some(b'Q');
            }
            b'b' => self.beats += 1,
            _ => {}
        }
        None
    }

    /// Applies every byte in order and returns the replies.
    pub fn receive_all(&mut self, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().filter_map(|&b| self.receive(b)).collect()
    }

    pub fn shows(&self, target: TrackState) -> bool {
        self.current == target.current()
            && self.total == target.total()
            && self.playing == target.is_playing()
    }

    fn step_forward(&mut self) {
        self.current = if self.current < self.total { self.current + 1 } else { 1 };
    }

    fn step_back(&mut self) {
        self.current = if self.current > 1 { self.current - 1 } else { self.total };
    }
}

// ── Rigs ──────────────────────────────────────────────────────────────────────

/// Link settings without the reset wait, for tests on the real clock.
pub fn fast_link() -> LinkSettings {
    LinkSettings {
        settle_delay: Duration::ZERO,
        read_timeout: Duration::from_millis(20),
        ..LinkSettings::default()
    }
}

pub fn target(current: u16, total: u16, playing: bool) -> TrackState {
    TrackState::new(current, total, playing).expect("test target must be valid")
}

pub fn engine_rig(
    link: LinkSettings,
) -> (
    MockSerialDriver,
    Arc<SyncEngine>,
    mpsc::UnboundedReceiver<EngineEvent>,
) {
    let driver = MockSerialDriver::new(&[PORT]);
    let (engine, events) = SyncEngine::new(Arc::new(driver.clone()), link, SyncTiming::default());
    (driver, engine, events)
}

pub struct MediatorRig {
    pub driver: MockSerialDriver,
    pub mediator: Arc<ControllerMediator>,
    pub ui: mpsc::UnboundedReceiver<UiEvent>,
}

impl MediatorRig {
    /// A disconnected mediator over a player holding `tracks` files, with the
    /// beat and time sync switched off.
    pub async fn with_tracks(tracks: usize) -> Self {
        let settings = MediatorSettings {
            beat_enabled: false,
            time_sync_enabled: false,
            ..MediatorSettings::default()
        };
        Self::build(tracks, settings).await
    }

    pub async fn build(tracks: usize, settings: MediatorSettings) -> Self {
        let driver = MockSerialDriver::new(&[PORT]);
        let (engine, engine_events) =
            SyncEngine::new(Arc::new(driver.clone()), fast_link(), SyncTiming::default());
        let player = PlaylistPlayer::new(PlayerSettings {
            verify_files: false,
            ..PlayerSettings::default()
        });
        let (mediator, ui) =
            ControllerMediator::new(Box::new(player), engine, engine_events, settings);
        if tracks > 0 {
            mediator.add_tracks(track_paths(tracks)).await;
        }
        Self {
            driver,
            mediator,
            ui,
        }
    }

    pub async fn connected_with_tracks(tracks: usize) -> Self {
        let rig = Self::with_tracks(tracks).await;
        rig.mediator.connect(PORT).await.expect("mock port opens");
        rig
    }

    /// What the peripheral would show after everything written so far.
    pub fn peripheral(&self) -> SimulatedPeripheral {
        let mut peripheral = SimulatedPeripheral::power_on();
        peripheral.receive_all(&self.driver.written_bytes());
        peripheral
    }

    pub fn drain_ui(&mut self) -> Vec<UiEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.ui.try_recv() {
            seen.push(event);
        }
        seen
    }
}

pub fn track_paths(n: usize) -> Vec<PathBuf> {
    (1..=n).map(|i| PathBuf::from(format!("track{i:02}.mp3"))).collect()
}

/// Polls `condition` every 10 ms until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Like [`eventually`], for conditions that need to await.
pub async fn eventually_async<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
