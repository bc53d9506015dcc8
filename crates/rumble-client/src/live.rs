//! Live-channel engine.
//!
//! Ships one input datagram per simulated frame and feeds received inputs
//! into the rollback engine, triggering a replay when one lands at or
//! before the latest committed frame. The channel is lossy and unordered
//! on purpose; prediction covers gaps and rollback repairs reordering.
//!
//! Fingerprints are compared when the matching snapshot is still in
//! history. A mismatch is logged and counted; recovery is not attempted.

use std::cell::RefCell;
use std::rc::Rc;

use rumble_core::{frame_distance, state_fingerprint, RollbackEngine, ScriptVm};
use rumble_proto::LiveMessage;

use crate::transport::DatagramChannel;

/// A fingerprint accompanies every sixteenth frame's input.
pub const HASH_INTERVAL: u16 = 16;

pub struct LiveChannel<C: DatagramChannel, V: ScriptVm> {
    channel: C,
    rollback: Rc<RefCell<RollbackEngine<V>>>,
    /// Highest remote frame seen; sent back to the peer as the ack.
    latest_remote: u16,
    saw_remote: bool,
    /// Highest of our frames the peer has confirmed.
    remote_acked: u16,
    /// Consecutive fingerprint mismatches.
    mismatches: u32,
    last_verified: Option<u16>,
}

impl<C: DatagramChannel, V: ScriptVm> LiveChannel<C, V> {
    pub fn new(channel: C, rollback: Rc<RefCell<RollbackEngine<V>>>) -> Self {
        Self {
            channel,
            rollback,
            latest_remote: 0,
            saw_remote: false,
            remote_acked: 0,
            mismatches: 0,
            last_verified: None,
        }
    }

    /// Emit the local input for `frame`, acknowledging the latest remote
    /// frame seen so far.
    pub fn send_input(&mut self, frame: u16, mask: u16) {
        let msg = LiveMessage::Input {
            frame,
            mask,
            ack: self.latest_remote,
        };
        self.channel.send(&msg.encode());
    }

    pub fn send_state_hash(&mut self, frame: u16, hash: u32) {
        let msg = LiveMessage::StateHash { frame, hash };
        self.channel.send(&msg.encode());
    }

    /// Feed one datagram received on the live channel.
    pub fn on_frame(&mut self, data: &[u8]) {
        let Some(message) = LiveMessage::decode(data) else {
            tracing::warn!(len = data.len(), "malformed live datagram dropped");
            return;
        };
        match message {
            LiveMessage::Input { frame, mask, ack } => self.on_input(frame, mask, ack),
            LiveMessage::StateHash { frame, hash } => self.on_state_hash(frame, hash),
        }
    }

    fn on_input(&mut self, frame: u16, mask: u16, ack: u16) {
        if !self.saw_remote || frame_distance(self.latest_remote, frame) > 0 {
            self.latest_remote = frame;
            self.saw_remote = true;
        }
        if frame_distance(self.remote_acked, ack) > 0 {
            self.remote_acked = ack;
        }

        let mut rollback = self.rollback.borrow_mut();
        rollback.set_remote_input(frame, mask);
        if frame_distance(frame, rollback.latest_frame()) >= 0 {
            rollback.rollback_from(frame);
        }
    }

    fn on_state_hash(&mut self, frame: u16, remote_hash: u32) {
        let local = self
            .rollback
            .borrow()
            .state_at(frame)
            .map(|s| state_fingerprint(&s));
        let Some(local_hash) = local else {
            // Snapshot already left the ring, or the frame is ahead of us.
            return;
        };
        if local_hash == remote_hash {
            self.mismatches = 0;
            self.last_verified = Some(frame);
            tracing::debug!(frame, hash = local_hash, "state fingerprint verified");
        } else {
            self.mismatches += 1;
            tracing::warn!(
                frame,
                local = local_hash,
                remote = remote_hash,
                count = self.mismatches,
                "state fingerprint mismatch"
            );
        }
    }

    /// Consecutive mismatches observed; diagnostic only.
    pub fn mismatch_count(&self) -> u32 {
        self.mismatches
    }

    pub fn last_verified_frame(&self) -> Option<u16> {
        self.last_verified
    }

    /// How far our committed frames run ahead of what the peer has
    /// confirmed receiving.
    pub fn frame_advantage(&self) -> i32 {
        frame_distance(self.remote_acked, self.rollback.borrow().latest_frame())
    }
}
