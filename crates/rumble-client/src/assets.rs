//! Asset-exchange engine.
//!
//! Delivers a complete bundle described by a manifest from one peer to the
//! other over the reliable asset channel, then tells the orchestrator the
//! bundle is assembled. The receive side is a small state machine:
//! announce arrives, the missing chunk set is requested, chunks stream in,
//! and assembly is re-checked after each one. The send side streams
//! requested chunks under backpressure.
//!
//! Failure is at most "incomplete": the engine never corrupts the store,
//! and a malformed frame is dropped where it is decoded.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rumble_core::{AssetManifest, ContentStore};
use rumble_proto::AssetMessage;

use crate::transport::ReliableChannel;

/// Pause streaming when the transport buffers more than this.
pub const HIGH_WATER: u64 = 1 << 20;
/// Resume once the buffered amount drains below this.
pub const LOW_WATER: u64 = 1 << 20;

/// What the engine reports up to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetEvent {
    /// Every hash in the manifest is now present in the store.
    BundleReady(AssetManifest),
    /// A script arrived on the asset channel.
    ScriptReceived { name: String, source: Vec<u8> },
    /// The peer armed the match.
    PeerStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiveState {
    Idle,
    Awaiting,
    Ready,
}

pub struct AssetExchange<C: ReliableChannel> {
    channel: C,
    store: Rc<RefCell<ContentStore>>,
    state: ReceiveState,
    /// Manifest most recently announced by the peer, until assembled.
    pending: Option<AssetManifest>,
    /// Encoded frames waiting for the channel to open or drain.
    outbox: VecDeque<Vec<u8>>,
    events: VecDeque<AssetEvent>,
}

impl<C: ReliableChannel> AssetExchange<C> {
    pub fn new(channel: C, store: Rc<RefCell<ContentStore>>) -> Self {
        Self {
            channel,
            store,
            state: ReceiveState::Idle,
            pending: None,
            outbox: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    pub fn poll_event(&mut self) -> Option<AssetEvent> {
        self.events.pop_front()
    }

    pub fn is_awaiting(&self) -> bool {
        self.state == ReceiveState::Awaiting
    }

    /// Announce a bundle to the peer. The chunks are expected to already
    /// be in the local store.
    pub fn announce(&mut self, manifest: &AssetManifest) {
        self.enqueue(AssetMessage::Manifest(manifest.clone()));
    }

    pub fn push_script(&mut self, name: &str, body: &[u8]) {
        self.enqueue(AssetMessage::ScriptPush {
            name: name.to_string(),
            body: body.to_vec(),
        });
    }

    pub fn send_game_start(&mut self) {
        self.enqueue(AssetMessage::GameStart);
    }

    /// Feed one frame received on the asset channel.
    pub fn on_frame(&mut self, data: &[u8]) {
        let Some(message) = AssetMessage::decode(data) else {
            tracing::warn!(len = data.len(), "malformed asset frame dropped");
            return;
        };
        match message {
            AssetMessage::Manifest(manifest) => self.on_manifest(manifest),
            AssetMessage::NeedChunks { hashes } => self.on_need_chunks(&hashes),
            AssetMessage::Chunk { hash, payload, .. } => self.on_chunk(&hash, payload),
            AssetMessage::ScriptPush { name, body } => {
                self.events
                    .push_back(AssetEvent::ScriptReceived { name, source: body });
            }
            AssetMessage::GameStart => self.events.push_back(AssetEvent::PeerStarted),
        }
    }

    /// The transport drained below the low-water mark; resume streaming.
    pub fn on_buffered_low(&mut self) {
        self.pump();
    }

    /// The channel just opened; flush anything queued while it was down.
    pub fn on_channel_open(&mut self) {
        self.pump();
    }

    fn on_manifest(&mut self, manifest: AssetManifest) {
        if let Err(err) = manifest.validate() {
            tracing::warn!(%err, id = %manifest.id, "rejected manifest");
            return;
        }
        let missing = manifest.missing_chunks(&self.store.borrow());
        tracing::info!(
            id = %manifest.id,
            chunks = manifest.chunks.len(),
            missing = missing.len(),
            "manifest announced"
        );
        if missing.is_empty() {
            self.state = ReceiveState::Ready;
            self.events
                .push_back(AssetEvent::BundleReady(manifest.clone()));
            self.pending = Some(manifest);
        } else {
            self.pending = Some(manifest);
            self.state = ReceiveState::Awaiting;
            self.enqueue(AssetMessage::NeedChunks { hashes: missing });
        }
    }

    fn on_need_chunks(&mut self, hashes: &[String]) {
        for hash in hashes {
            // A hash we do not hold is skipped; the peer stays incomplete
            // until someone announces a bundle that carries it.
            let Some(payload) = self.store.borrow().get(hash).map(<[u8]>::to_vec) else {
                tracing::warn!(%hash, "requested chunk not in store, skipped");
                continue;
            };
            self.outbox.push_back(
                AssetMessage::Chunk {
                    hash: hash.clone(),
                    offset: 0,
                    payload,
                }
                .encode(),
            );
        }
        self.pump();
    }

    fn on_chunk(&mut self, hash: &str, payload: Vec<u8>) {
        self.store.borrow_mut().put(hash, payload);
        // A chunk outside the pending manifest is stored but changes no
        // state; re-check assembly only while awaiting.
        if self.state != ReceiveState::Awaiting {
            return;
        }
        let complete = self
            .pending
            .as_ref()
            .is_some_and(|m| m.is_complete(&self.store.borrow()));
        if complete {
            self.state = ReceiveState::Ready;
            if let Some(manifest) = self.pending.clone() {
                tracing::info!(id = %manifest.id, "bundle assembled");
                self.events.push_back(AssetEvent::BundleReady(manifest));
            }
        }
    }

    fn enqueue(&mut self, message: AssetMessage) {
        self.outbox.push_back(message.encode());
        self.pump();
    }

    /// Drain the outbox while the channel is open and under the high-water
    /// mark. Whatever remains waits for the buffered-amount-low event.
    fn pump(&mut self) {
        while let Some(frame) = self.outbox.front() {
            if !self.channel.is_open() || self.channel.buffered_amount() > HIGH_WATER {
                return;
            }
            self.channel.send(frame);
            self.outbox.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumble_core::{BundleKind, ChunkEntry};

    /// Channel fake that records frames and simulates a buffered amount
    /// growing with every send and draining on demand.
    #[derive(Clone, Default)]
    struct TestChannel {
        inner: Rc<RefCell<TestChannelState>>,
    }

    #[derive(Default)]
    struct TestChannelState {
        open: bool,
        sent: Vec<Vec<u8>>,
        buffered: u64,
    }

    impl TestChannel {
        fn open() -> Self {
            let ch = Self::default();
            ch.inner.borrow_mut().open = true;
            ch
        }

        fn sent(&self) -> Vec<Vec<u8>> {
            self.inner.borrow().sent.clone()
        }

        fn sent_messages(&self) -> Vec<AssetMessage> {
            self.sent()
                .iter()
                .filter_map(|f| AssetMessage::decode(f))
                .collect()
        }

        fn drain(&self) {
            self.inner.borrow_mut().buffered = 0;
        }
    }

    impl ReliableChannel for TestChannel {
        fn is_open(&self) -> bool {
            self.inner.borrow().open
        }

        fn send(&self, frame: &[u8]) {
            let mut state = self.inner.borrow_mut();
            state.buffered += frame.len() as u64;
            state.sent.push(frame.to_vec());
        }

        fn buffered_amount(&self) -> u64 {
            self.inner.borrow().buffered
        }
    }

    fn store_with(payloads: &[&[u8]]) -> Rc<RefCell<ContentStore>> {
        let mut store = ContentStore::new();
        for p in payloads {
            store.put(&ContentStore::hash_of(p), p.to_vec());
        }
        Rc::new(RefCell::new(store))
    }

    fn manifest_of(payloads: &[&[u8]]) -> AssetManifest {
        AssetManifest {
            id: "bundle".to_string(),
            kind: BundleKind::Mesh,
            entry: ContentStore::hash_of(payloads[0]),
            chunks: payloads
                .iter()
                .map(|p| ChunkEntry {
                    hash: ContentStore::hash_of(p),
                    size: p.len() as u32,
                    mime: "application/octet-stream".to_string(),
                })
                .collect(),
            meta: None,
        }
    }

    fn exchange(channel: &TestChannel, store: &Rc<RefCell<ContentStore>>) -> AssetExchange<TestChannel> {
        AssetExchange::new(channel.clone(), store.clone())
    }

    #[test]
    fn complete_manifest_is_ready_without_requests() {
        let channel = TestChannel::open();
        let store = store_with(&[b"a", b"b"]);
        let mut eng = exchange(&channel, &store);

        let manifest = manifest_of(&[b"a", b"b"]);
        eng.on_frame(&AssetMessage::Manifest(manifest.clone()).encode());

        assert_eq!(eng.poll_event(), Some(AssetEvent::BundleReady(manifest)));
        assert!(channel.sent().is_empty());
    }

    #[test]
    fn missing_chunks_are_requested_then_assembled() {
        let channel = TestChannel::open();
        let store = store_with(&[b"a"]);
        let mut eng = exchange(&channel, &store);

        let manifest = manifest_of(&[b"a", b"b", b"c"]);
        eng.on_frame(&AssetMessage::Manifest(manifest.clone()).encode());
        assert!(eng.is_awaiting());
        assert_eq!(eng.poll_event(), None);

        let sent = channel.sent_messages();
        assert_eq!(
            sent,
            vec![AssetMessage::NeedChunks {
                hashes: vec![ContentStore::hash_of(b"b"), ContentStore::hash_of(b"c")],
            }]
        );

        eng.on_frame(
            &AssetMessage::Chunk {
                hash: ContentStore::hash_of(b"b"),
                offset: 0,
                payload: b"b".to_vec(),
            }
            .encode(),
        );
        assert_eq!(eng.poll_event(), None);

        eng.on_frame(
            &AssetMessage::Chunk {
                hash: ContentStore::hash_of(b"c"),
                offset: 0,
                payload: b"c".to_vec(),
            }
            .encode(),
        );
        assert_eq!(eng.poll_event(), Some(AssetEvent::BundleReady(manifest)));
        assert!(!eng.is_awaiting());
    }

    #[test]
    fn need_chunks_streams_held_chunks_and_skips_unknown() {
        let channel = TestChannel::open();
        let store = store_with(&[b"held"]);
        let mut eng = exchange(&channel, &store);

        eng.on_frame(
            &AssetMessage::NeedChunks {
                hashes: vec![
                    ContentStore::hash_of(b"held"),
                    ContentStore::hash_of(b"absent"),
                ],
            }
            .encode(),
        );

        assert_eq!(
            channel.sent_messages(),
            vec![AssetMessage::Chunk {
                hash: ContentStore::hash_of(b"held"),
                offset: 0,
                payload: b"held".to_vec(),
            }]
        );
    }

    #[test]
    fn backpressure_pauses_and_low_water_resumes() {
        let channel = TestChannel::open();
        let half_mib = vec![0u8; 512 * 1024];
        let payloads: Vec<Vec<u8>> = (0..10u8)
            .map(|i| {
                let mut p = half_mib.clone();
                p[0] = i;
                p
            })
            .collect();
        let refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
        let store = store_with(&refs);
        let mut eng = exchange(&channel, &store);

        let hashes: Vec<String> = payloads.iter().map(|p| ContentStore::hash_of(p)).collect();
        eng.on_frame(
            &AssetMessage::NeedChunks {
                hashes: hashes.clone(),
            }
            .encode(),
        );

        // Two half-MiB chunks fit before the buffered amount crosses the
        // high-water mark; the third waits.
        assert_eq!(channel.sent().len(), 2);

        let mut total: usize = channel.sent().iter().map(Vec::len).sum();
        while channel.sent().len() < 10 {
            let before = channel.sent().len();
            channel.drain();
            eng.on_buffered_low();
            assert!(channel.sent().len() > before);
            total = channel.sent().iter().map(Vec::len).sum();
        }

        let expected: usize = payloads
            .iter()
            .map(|p| {
                AssetMessage::Chunk {
                    hash: ContentStore::hash_of(p),
                    offset: 0,
                    payload: p.clone(),
                }
                .encode()
                .len()
            })
            .sum();
        assert_eq!(total, expected);
        assert_eq!(channel.sent_messages().len(), 10);
    }

    #[test]
    fn sends_wait_for_the_channel_to_open() {
        let channel = TestChannel::default();
        let store = store_with(&[]);
        let mut eng = exchange(&channel, &store);

        eng.send_game_start();
        assert!(channel.sent().is_empty());

        channel.inner.borrow_mut().open = true;
        eng.on_channel_open();
        assert_eq!(channel.sent_messages(), vec![AssetMessage::GameStart]);
    }

    #[test]
    fn unsolicited_chunk_is_stored_without_state_change() {
        let channel = TestChannel::open();
        let store = store_with(&[]);
        let mut eng = exchange(&channel, &store);

        eng.on_frame(
            &AssetMessage::Chunk {
                hash: ContentStore::hash_of(b"stray"),
                offset: 0,
                payload: b"stray".to_vec(),
            }
            .encode(),
        );
        assert!(store.borrow().has(&ContentStore::hash_of(b"stray")));
        assert_eq!(eng.poll_event(), None);
        assert!(!eng.is_awaiting());
    }

    #[test]
    fn script_push_and_game_start_surface_as_events() {
        let channel = TestChannel::open();
        let store = store_with(&[]);
        let mut eng = exchange(&channel, &store);

        eng.on_frame(
            &AssetMessage::ScriptPush {
                name: "walker".to_string(),
                body: b"fn tick(frame, input) {}".to_vec(),
            }
            .encode(),
        );
        eng.on_frame(&AssetMessage::GameStart.encode());

        assert_eq!(
            eng.poll_event(),
            Some(AssetEvent::ScriptReceived {
                name: "walker".to_string(),
                source: b"fn tick(frame, input) {}".to_vec(),
            })
        );
        assert_eq!(eng.poll_event(), Some(AssetEvent::PeerStarted));
    }

    #[test]
    fn malformed_frame_is_dropped() {
        let channel = TestChannel::open();
        let store = store_with(&[]);
        let mut eng = exchange(&channel, &store);
        eng.on_frame(&[0xAB, 0xCD]);
        assert_eq!(eng.poll_event(), None);
        assert!(channel.sent().is_empty());
    }
}
