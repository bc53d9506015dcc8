//! Input-synchronized rollback simulation.
//!
//! Committed snapshots live in a fixed ring of [`HISTORY_LEN`] slots; the
//! slot for frame `f` is `f % HISTORY_LEN`. Forward simulation predicts a
//! missing remote input by carrying the last known mask forward. When the
//! real input arrives for an already-committed frame, the engine rewinds
//! to the preceding snapshot and replays.
//!
//! Each slot also carries both VM scopes, so replay resumes the scripts
//! exactly where they were at that frame (snapshot/restore rather than
//! re-seeding from frame zero).

use crate::input::InputRing;
use crate::script::ScriptVm;
use crate::state::GameState;
use crate::step;

/// History capacity in frames. Sized so the worst-case rollback distance
/// (RTT tail at 60 Hz plus margin) stays comfortably inside the ring.
pub const HISTORY_LEN: usize = 128;

/// Which fighter this peer controls. Player one on one peer must be
/// player one on the other, so both rings line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSide {
    One,
    Two,
}

impl PlayerSide {
    fn index(self) -> usize {
        match self {
            PlayerSide::One => 0,
            PlayerSide::Two => 1,
        }
    }

    pub fn other(self) -> PlayerSide {
        match self {
            PlayerSide::One => PlayerSide::Two,
            PlayerSide::Two => PlayerSide::One,
        }
    }
}

/// Signed distance from `from` to `to` on the wrapping 16-bit frame line.
/// Positive means `to` is ahead of `from`.
pub fn frame_distance(from: u16, to: u16) -> i32 {
    let d = to.wrapping_sub(from);
    if d < 0x8000 {
        i32::from(d)
    } else {
        i32::from(d) - 0x1_0000
    }
}

struct Slot<V: ScriptVm> {
    state: GameState,
    vm1: V::Snapshot,
    vm2: V::Snapshot,
}

impl<V: ScriptVm> Clone for Slot<V> {
    fn clone(&self) -> Self {
        Self {
            state: self.state,
            vm1: self.vm1.clone(),
            vm2: self.vm2.clone(),
        }
    }
}

pub struct RollbackEngine<V: ScriptVm> {
    side: PlayerSide,
    /// Input rings, index 0 for player one.
    rings: [InputRing; 2],
    history: Vec<Slot<V>>,
    latest: u16,
    vm1: V,
    vm2: V,
}

impl<V: ScriptVm> RollbackEngine<V> {
    /// Seed a fresh engine at frame zero. `vm1`/`vm2` are the per-player
    /// instances, already loaded with the match script.
    pub fn new(seed: GameState, vm1: V, vm2: V, side: PlayerSide) -> Self {
        let origin = Slot {
            state: seed,
            vm1: vm1.snapshot(),
            vm2: vm2.snapshot(),
        };
        Self {
            side,
            rings: [InputRing::new(), InputRing::new()],
            history: vec![origin; HISTORY_LEN],
            latest: seed.frame,
            vm1,
            vm2,
        }
    }

    pub fn side(&self) -> PlayerSide {
        self.side
    }

    pub fn latest_frame(&self) -> u16 {
        self.latest
    }

    /// Copy of the latest committed snapshot.
    pub fn latest(&self) -> GameState {
        self.history[Self::slot(self.latest)].state
    }

    /// State for `frame` if its snapshot is still in the ring.
    pub fn state_at(&self, frame: u16) -> Option<GameState> {
        let slot = &self.history[Self::slot(frame)];
        (slot.state.frame == frame).then_some(slot.state)
    }

    pub fn set_local_input(&mut self, frame: u16, mask: u16) {
        self.rings[self.side.index()].store(frame, mask);
    }

    /// Record a remote input. Inputs too old to roll back to are dropped;
    /// inputs ahead of the latest frame are picked up by the next
    /// `simulate_to`. The caller decides whether to trigger a rollback.
    pub fn set_remote_input(&mut self, frame: u16, mask: u16) {
        let behind = frame_distance(frame, self.latest);
        if behind > 0 && !self.can_rewind_to(frame) {
            tracing::warn!(
                frame,
                latest = self.latest,
                "remote input older than history, dropped"
            );
            return;
        }
        self.rings[self.side.other().index()].store(frame, mask);
    }

    /// Advance from the latest committed frame up to `target`, committing
    /// every intermediate frame. A target at or behind the latest frame is
    /// a no-op.
    pub fn simulate_to(&mut self, target: u16) {
        let steps = frame_distance(self.latest, target);
        for _ in 0..steps.max(0) {
            self.step_once();
        }
    }

    /// Re-simulate from `frame - 1` up to the current latest frame,
    /// overwriting each history slot. Call after a remote input landed at
    /// or before the latest committed frame.
    pub fn rollback_from(&mut self, frame: u16) {
        if frame_distance(frame, self.latest) < 0 {
            return;
        }
        let resume = frame.wrapping_sub(1);
        let slot = &self.history[Self::slot(resume)];
        if slot.state.frame != resume {
            tracing::warn!(frame, latest = self.latest, "rollback beyond history");
            return;
        }
        self.vm1.restore(&slot.vm1);
        self.vm2.restore(&slot.vm2);
        let target = self.latest;
        self.latest = resume;
        self.simulate_to(target);
    }

    fn step_once(&mut self) {
        let next = self.latest.wrapping_add(1);
        let input1 = self.input_for(0, next);
        let input2 = self.input_for(1, next);
        let mut state = self.history[Self::slot(self.latest)].state;
        step::advance(&mut state, input1, input2, &mut self.vm1, &mut self.vm2);
        self.history[Self::slot(next)] = Slot {
            state,
            vm1: self.vm1.snapshot(),
            vm2: self.vm2.snapshot(),
        };
        self.latest = next;
    }

    /// Input lookup policy: a written slot wins. An unwritten remote slot
    /// falls back to the previous frame's mask (last-known prediction),
    /// which is carried forward so longer gaps chain off it. An unwritten
    /// local slot reads as zero.
    fn input_for(&mut self, player: usize, frame: u16) -> u16 {
        let ring = &mut self.rings[player];
        if ring.is_written(frame) {
            return ring.mask_at(frame);
        }
        if player == self.side.other().index() {
            let predicted = ring.mask_at(frame.wrapping_sub(1));
            ring.carry_forward(frame, predicted);
            predicted
        } else {
            0
        }
    }

    /// True when the snapshot for `frame - 1` is still in the ring.
    fn can_rewind_to(&self, frame: u16) -> bool {
        let resume = frame.wrapping_sub(1);
        self.history[Self::slot(resume)].state.frame == resume
    }

    fn slot(frame: u16) -> usize {
        frame as usize % HISTORY_LEN
    }
}
