//! Channel seams between the engines and the peer connection.
//!
//! The engines talk to traits so they can run against in-memory fakes in
//! tests; the browser session installs real WebRTC data channels behind
//! the same handles once negotiation produces them.

use std::cell::RefCell;
use std::rc::Rc;

use web_sys::RtcDataChannel;

/// Reliable, ordered, message-oriented byte channel (the asset channel).
pub trait ReliableChannel {
    fn is_open(&self) -> bool;
    fn send(&self, frame: &[u8]);
    /// Bytes queued locally but not yet handed to the network.
    fn buffered_amount(&self) -> u64;
}

/// Unordered, zero-retransmit datagram channel (the live channel).
/// Loss and reordering are expected; the rollback engine absorbs both.
pub trait DatagramChannel {
    fn is_open(&self) -> bool;
    fn send(&self, frame: &[u8]);
}

/// Late-bound handle to a WebRTC data channel.
///
/// Engines hold the handle from construction; the session installs the
/// channel whenever negotiation (or the remote peer, on the answering
/// side) produces it. Until then the channel reports closed and sends are
/// dropped here, with the asset engine's own queue providing the
/// "never lose data" guarantee.
#[derive(Clone, Default)]
pub struct ChannelSlot {
    inner: Rc<RefCell<Option<RtcDataChannel>>>,
}

impl ChannelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, channel: RtcDataChannel) {
        *self.inner.borrow_mut() = Some(channel);
    }

    pub fn close(&self) {
        if let Some(channel) = self.inner.borrow_mut().take() {
            channel.close();
        }
    }
}

impl ReliableChannel for ChannelSlot {
    fn is_open(&self) -> bool {
        self.inner
            .borrow()
            .as_ref()
            .is_some_and(|c| c.ready_state() == web_sys::RtcDataChannelState::Open)
    }

    fn send(&self, frame: &[u8]) {
        if let Some(channel) = self.inner.borrow().as_ref() {
            if let Err(err) = channel.send_with_u8_array(frame) {
                tracing::warn!(?err, "asset channel send failed");
            }
        }
    }

    fn buffered_amount(&self) -> u64 {
        self.inner
            .borrow()
            .as_ref()
            .map_or(0, |c| u64::from(c.buffered_amount()))
    }
}

impl DatagramChannel for ChannelSlot {
    fn is_open(&self) -> bool {
        ReliableChannel::is_open(self)
    }

    fn send(&self, frame: &[u8]) {
        // Live datagrams are fire-and-forget; a send on a closed or
        // congested channel is just another lost packet.
        if let Some(channel) = self.inner.borrow().as_ref() {
            let _ = channel.send_with_u8_array(frame);
        }
    }
}
