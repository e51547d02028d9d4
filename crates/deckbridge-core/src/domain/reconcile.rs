//! Reconciliation planning.
//!
//! Given what the peripheral shows (the shadow) and what it should show (the
//! target), produce the command sequence that walks one to the other using
//! only ±1 counter bumps and a play/pause byte.
//!
//! # Algorithm
//!
//! 1. **Total count**: `T` until the totals match when growing, `D` when
//!    shrinking.
//! 2. **Cursor**: `C` while the shadow cursor is below the target, `V` while
//!    it is above.  After step 1 the shadow cursor may sit past the new total;
//!    the `V` run walks it back into range.
//! 3. **Play flag**: one `P` or `S` if the flags differ.
//!
//! The planner simulates every command through [`ShadowState::apply`], so the
//! plan's `expected` state is exactly what the peripheral shows once every
//! command has been delivered.

use crate::domain::playback::{ShadowState, TrackDirection, TrackState};
use crate::protocol::commands::OutboundCommand;

/// An ordered command sequence plus the shadow it leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    commands: Vec<OutboundCommand>,
    expected: ShadowState,
}

impl ReconcilePlan {
    pub fn commands(&self) -> &[OutboundCommand] {
        &self.commands
    }

    /// Shadow state after every command in the plan has been applied.
    pub fn expected(&self) -> ShadowState {
        self.expected
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = OutboundCommand> + '_ {
        self.commands.iter().copied()
    }

    fn push(&mut self, command: OutboundCommand) {
        self.expected.apply(command);
        self.commands.push(command);
    }
}

/// Plans the minimal command sequence from `shadow` to `target`.
///
/// Returns an empty plan when the shadow already matches.
pub fn plan_reconciliation(shadow: &ShadowState, target: &TrackState) -> ReconcilePlan {
    let mut plan = ReconcilePlan {
        commands: Vec::new(),
        expected: *shadow,
    };

    // Totals first so the cursor walk below happens inside the final range.
    while plan.expected.total < target.total() {
        plan.push(OutboundCommand::TotalIncrement);
    }
    while plan.expected.total > target.total() {
        plan.push(OutboundCommand::TotalDecrement);
    }

    while plan.expected.current < target.current() {
        plan.push(OutboundCommand::CursorForward);
    }
    while plan.expected.current > target.current() {
        plan.push(OutboundCommand::CursorBackward);
    }

    if plan.expected.playing != target.is_playing() {
        plan.push(play_flag_command(target.is_playing()));
    }

    plan
}

/// Plans a one-step track change followed by play-flag alignment.
///
/// The shortcut byte is always emitted; the play byte only when the shadow's
/// flag differs from `playing_after` once the shortcut has landed.
pub fn plan_track_change(
    shadow: &ShadowState,
    direction: TrackDirection,
    playing_after: bool,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan {
        commands: Vec::new(),
        expected: *shadow,
    };
    plan.push(direction.shortcut());
    if plan.expected.playing != playing_after {
        plan.push(play_flag_command(playing_after));
    }
    plan
}

fn play_flag_command(playing: bool) -> OutboundCommand {
    if playing {
        OutboundCommand::Play
    } else {
        OutboundCommand::Pause
    }
}
