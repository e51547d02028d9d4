//! Integration tests for the sync engine over the mock serial driver.
//!
//! # What is covered
//!
//! - The byte sequences the engine emits for the reference scenarios, read
//!   back from the mock driver exactly as they would reach the wire.
//! - Round-trip laws: a second identical request sends nothing, next-then-prev
//!   returns the shadow to where it started.
//! - Pacing: settle delay, inter-byte gap, counter-bump gap and post-shortcut
//!   gap, measured on tokio's paused clock from the mock's write timestamps.
//! - Link loss and inbound intent dispatch.
//!
//! Timing tests run with `start_paused = true`.  Tests that need inbound
//! bytes run on the real clock, because the reader is an OS thread.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{engine_rig, fast_link, target, SimulatedPeripheral, PORT};
use deckbridge_core::{InboundEvent, ShadowState, TrackDirection};
use deckbridge_host::application::sync_engine::{EngineEvent, IntentHandler, SyncEngine};
use deckbridge_host::infrastructure::serial::mock::WrittenByte;
use deckbridge_host::infrastructure::serial::{LinkSettings, LinkState, LOST_CONNECTION_STATUS};
use tokio::sync::mpsc;

fn shadow(current: u16, total: u16, playing: bool) -> ShadowState {
    ShadowState {
        current,
        total,
        playing,
    }
}

/// Gaps between consecutive writes.
fn gaps(written: &[WrittenByte]) -> Vec<Duration> {
    written.windows(2).map(|w| w[1].at - w[0].at).collect()
}

// ── Reference scenarios ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_growth_from_origin_sends_track_count_bumps() {
    // Arrange
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();

    // Act
    engine.request_target_state(target(1, 5, false)).await.unwrap();

    // Assert
    assert_eq!(driver.written_text(), "TTTT");
    assert_eq!(engine.shadow().await, shadow(1, 5, false));
}

#[tokio::test(start_paused = true)]
async fn test_cursor_forward_then_play() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.request_target_state(target(1, 5, false)).await.unwrap();
    driver.clear_written();

    engine.request_target_state(target(3, 5, true)).await.unwrap();

    assert_eq!(driver.written_text(), "CCP");
    assert_eq!(engine.shadow().await, shadow(3, 5, true));
}

#[tokio::test(start_paused = true)]
async fn test_next_at_last_track_wraps_with_single_shortcut() {
    // Arrange: 5/5 playing.
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.request_target_state(target(5, 5, true)).await.unwrap();
    driver.clear_written();

    // Act
    engine
        .request_track_change(TrackDirection::Next, true)
        .await
        .unwrap();
    engine.request_target_state(target(1, 5, true)).await.unwrap();

    // Assert
    assert_eq!(driver.written_text(), "N");
    assert_eq!(engine.shadow().await, shadow(1, 5, true));
}

#[tokio::test(start_paused = true)]
async fn test_shrink_walks_total_down_then_cursor_back() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.request_target_state(target(4, 5, true)).await.unwrap();
    driver.clear_written();

    engine.request_target_state(target(3, 3, true)).await.unwrap();

    assert_eq!(driver.written_text(), "DDV");
    assert_eq!(engine.shadow().await, shadow(3, 3, true));
}

// ── Serialised passes ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_run_one_pass_after_the_other() {
    // Arrange
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();

    // Act: the second request is issued while the first is still sending.
    let (first, second) = tokio::join!(
        engine.request_target_state(target(1, 5, false)),
        engine.request_target_state(target(3, 5, true)),
    );

    // Assert
    assert!(first.is_ok() && second.is_ok());
    assert_eq!(driver.written_text(), "TTTTCCP");
    assert_eq!(engine.shadow().await, shadow(3, 5, true));
}

#[tokio::test(start_paused = true)]
async fn test_beat_during_pass_waits_for_the_pass_to_finish() {
    // Arrange: a growth pass is under way.
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    let growth = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.request_target_state(target(1, 5, false)).await }
    });
    tokio::time::sleep(Duration::from_millis(25)).await;
    assert_eq!(driver.written_text(), "TT");

    // Act
    let (beat, navigate) = tokio::join!(
        engine.emit_beat(),
        engine.request_target_state(target(3, 5, true)),
    );

    // Assert
    assert!(growth.await.unwrap().is_ok());
    assert!(beat.is_ok() && navigate.is_ok());
    assert_eq!(driver.written_text(), "TTTTbCCP");
    assert_eq!(engine.shadow().await, shadow(3, 5, true));
}

#[tokio::test(start_paused = true)]
async fn test_peripheral_display_follows_growth_and_forward_navigation() {
    // Arrange
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    let steps = [target(1, 4, false), target(2, 4, false), target(4, 6, true)];

    for step in steps {
        // Act
        engine.request_target_state(step).await.unwrap();

        // Assert
        let mut peripheral = SimulatedPeripheral::power_on();
        peripheral.receive_all(&driver.written_bytes());
        assert!(peripheral.shows(step), "peripheral {peripheral:?} != {step:?}");
    }
}

// ── Round-trip laws ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_repeated_request_sends_nothing() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.request_target_state(target(2, 7, true)).await.unwrap();
    let first = driver.written().len();

    engine.request_target_state(target(2, 7, true)).await.unwrap();

    assert_eq!(driver.written().len(), first);
}

#[tokio::test(start_paused = true)]
async fn test_next_then_prev_restores_shadow() {
    let (_driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.request_target_state(target(3, 4, false)).await.unwrap();
    let before = engine.shadow().await;

    engine
        .request_track_change(TrackDirection::Next, false)
        .await
        .unwrap();
    engine
        .request_track_change(TrackDirection::Prev, false)
        .await
        .unwrap();

    assert_eq!(engine.shadow().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_connection_needs_nothing_for_origin() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.on_connected().await;

    engine.request_target_state(target(1, 1, false)).await.unwrap();

    assert!(driver.written().is_empty());
}

#[tokio::test]
async fn test_disconnected_engine_sends_nothing_and_keeps_shadow() {
    let (driver, engine, _events) = engine_rig(fast_link());

    let result = engine.request_track_change(TrackDirection::Next, true).await;

    assert!(matches!(result, Err(ref e) if e.is_not_connected()));
    assert_eq!(engine.shadow().await, ShadowState::ORIGIN);
    assert!(driver.written().is_empty());
}

// ── Pacing ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_first_write_waits_for_settle_delay() {
    // Arrange
    let (driver, engine, _events) = engine_rig(LinkSettings::default());
    let opened_at = tokio::time::Instant::now();
    engine.connect(PORT).await.unwrap();

    // Act
    engine.request_target_state(target(1, 2, false)).await.unwrap();

    // Assert
    let written = driver.written();
    assert_eq!(written.len(), 1);
    assert!(written[0].at - opened_at >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_counter_bumps_are_spaced_by_counter_gap() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();

    engine.request_target_state(target(3, 4, true)).await.unwrap();

    let written = driver.written();
    assert_eq!(driver.written_text(), "TTTCCP");
    for gap in gaps(&written) {
        assert!(gap >= Duration::from_millis(20), "gap {gap:?} too short");
    }
}

#[tokio::test(start_paused = true)]
async fn test_play_state_follows_shortcut_after_shortcut_gap() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.request_target_state(target(1, 3, false)).await.unwrap();
    driver.clear_written();

    engine
        .request_track_change(TrackDirection::Next, true)
        .await
        .unwrap();

    let written = driver.written();
    assert_eq!(driver.written_text(), "NP");
    assert!(written[1].at - written[0].at >= Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn test_plain_bytes_respect_inter_byte_delay() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();

    engine.request_target_state(target(1, 1, true)).await.unwrap();
    engine.emit_beat().await.unwrap();
    engine.emit_beat().await.unwrap();

    let written = driver.written();
    assert_eq!(driver.written_text(), "Pbb");
    for gap in gaps(&written) {
        assert!(gap >= Duration::from_millis(10), "gap {gap:?} too short");
    }
}

// ── Link loss ─────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_write_failure_marks_link_lost_and_keeps_partial_progress() {
    // Arrange
    let (driver, engine, mut events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    engine.request_target_state(target(1, 2, false)).await.unwrap();
    driver.fail_writes(true);

    // Act
    let result = engine.request_target_state(target(1, 5, false)).await;

    // Assert
    assert!(result.is_err());
    assert!(matches!(engine.link_state(), LinkState::Lost { .. }));
    assert!(!engine.is_connected());
    assert_eq!(engine.shadow().await, shadow(1, 2, false));

    let mut statuses = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(1), events.recv()).await {
        if let EngineEvent::Status(text) = event {
            statuses.push(text);
        }
    }
    assert_eq!(
        statuses,
        vec![format!("Connected to {PORT}"), LOST_CONNECTION_STATUS.to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_requests_after_loss_fail_fast() {
    let (driver, engine, _events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();
    driver.fail_writes(true);
    let _ = engine.request_target_state(target(1, 3, false)).await;
    driver.fail_writes(false);

    let result = engine.request_target_state(target(1, 3, false)).await;

    assert!(result.is_err());
    assert!(driver.written().is_empty());
}

#[tokio::test]
async fn test_read_failure_reports_lost_connection() {
    let (driver, engine, mut events) = engine_rig(fast_link());
    engine.connect(PORT).await.unwrap();

    driver.inject_read_failure("device unplugged");

    let lost = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(event) = events.recv().await {
            if event == EngineEvent::Status(LOST_CONNECTION_STATUS.to_string()) {
                return true;
            }
        }
        false
    })
    .await;
    assert!(matches!(lost, Ok(true)));
    assert!(!engine.is_connected());
}

// ── Inbound intents ───────────────────────────────────────────────────────────

/// Forwards every intent it receives to a channel.
struct ForwardingHandler {
    seen: mpsc::UnboundedSender<InboundEvent>,
}

#[async_trait]
impl IntentHandler for ForwardingHandler {
    async fn on_play(&self) {
        let _ = self.seen.send(InboundEvent::Play);
    }
    async fn on_pause(&self) {
        let _ = self.seen.send(InboundEvent::Pause);
    }
    async fn on_next(&self) {
        let _ = self.seen.send(InboundEvent::NextTrack);
    }
    async fn on_prev(&self) {
        let _ = self.seen.send(InboundEvent::PrevTrack);
    }
    async fn on_seek_relative(&self, delta_secs: i32) {
        let _ = self.seen.send(InboundEvent::SeekRelative(delta_secs));
    }
    async fn on_status_request(&self) {
        let _ = self.seen.send(InboundEvent::StatusRequest);
    }
}

#[tokio::test]
async fn test_each_inbound_byte_invokes_one_handler_method_in_order() {
    // Arrange
    let (driver, engine, _events) = engine_rig(fast_link());
    let (seen_tx, mut seen) = mpsc::unbounded_channel();
    let handler: Arc<dyn IntentHandler> = Arc::new(ForwardingHandler { seen: seen_tx });
    engine.set_intent_handler(Arc::downgrade(&handler));
    engine.connect(PORT).await.unwrap();

    // Act: two chunks, with an unknown byte that must be skipped.
    driver.inject_inbound(b"PSN?");
    driver.inject_inbound(b"BFRQ");

    // Assert
    let mut received = Vec::new();
    while received.len() < 7 {
        match tokio::time::timeout(Duration::from_secs(2), seen.recv()).await {
            Ok(Some(intent)) => received.push(intent),
            _ => break,
        }
    }
    assert_eq!(
        received,
        vec![
            InboundEvent::Play,
            InboundEvent::Pause,
            InboundEvent::NextTrack,
            InboundEvent::PrevTrack,
            InboundEvent::SeekRelative(30),
            InboundEvent::SeekRelative(-30),
            InboundEvent::StatusRequest,
        ]
    );
    assert!(
        tokio::time::timeout(Duration::from_millis(100), seen.recv())
            .await
            .is_err(),
        "the unknown byte must not produce an intent"
    );
}

#[tokio::test]
async fn test_handler_may_call_back_into_engine() {
    /// Answers every status request by re-sending the current target.
    struct Resync {
        engine: Arc<SyncEngine>,
        done: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl IntentHandler for Resync {
        async fn on_status_request(&self) {
            let _ = self.engine.request_target_state(target(2, 2, false)).await;
            let _ = self.done.send(());
        }
    }

    // Arrange
    let (driver, engine, _events) = engine_rig(fast_link());
    let (done_tx, mut done) = mpsc::unbounded_channel();
    let handler: Arc<dyn IntentHandler> = Arc::new(Resync {
        engine: Arc::clone(&engine),
        done: done_tx,
    });
    engine.set_intent_handler(Arc::downgrade(&handler));
    engine.connect(PORT).await.unwrap();

    // Act
    driver.inject_inbound(b"Q");

    // Assert: no deadlock, and the bytes went out.
    let finished = tokio::time::timeout(Duration::from_secs(2), done.recv()).await;
    assert!(matches!(finished, Ok(Some(()))));
    assert_eq!(driver.written_text(), "TC");
}
