//! Match orchestration.
//!
//! Owns the rollback engine, the content store and the global script VM;
//! wires the asset and live engines to them; and drives the fixed 60 Hz
//! loop off the browser's animation-frame timestamps. Within one tick the
//! order is fixed: commit local input, simulate, hand the snapshot to the
//! viewer, then emit on the network — both peers must fingerprint the same
//! committed snapshot.

use std::cell::RefCell;
use std::rc::Rc;

use rumble_core::{
    state_fingerprint, AssetManifest, BundleKind, ChunkEntry, ContentStore, GameState,
    PlayerSide, RollbackEngine, ScriptVm,
};

use crate::assets::{AssetEvent, AssetExchange};
use crate::live::{LiveChannel, HASH_INTERVAL};
use crate::sampler::InputSource;
use crate::transport::{DatagramChannel, ReliableChannel};
use crate::viewer::StageViewer;

/// Nominal tick period.
pub const TICK_MS: f64 = 1000.0 / 60.0;
/// Cap on per-callback elapsed time, to avoid a catch-up spiral after a
/// background tab wakes up.
const MAX_DELTA_MS: f64 = 100.0;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing loaded yet.
    Idle,
    /// Bundle or script still outstanding.
    Loading,
    /// Everything loaded, waiting for a game start from either side.
    Armed,
    /// Co-simulation running.
    Running,
}

/// Sink for user-visible status strings.
pub type StatusSink = Box<dyn Fn(&str)>;

pub struct Orchestrator<A, L, V>
where
    A: ReliableChannel,
    L: DatagramChannel,
    V: ScriptVm,
{
    assets: AssetExchange<A>,
    live: LiveChannel<L, V>,
    rollback: Rc<RefCell<RollbackEngine<V>>>,
    store: Rc<RefCell<ContentStore>>,
    /// Global VM holding the compiled match script; the two per-player
    /// instances are cloned off it on every (re)seed.
    global_vm: V,
    side: PlayerSide,
    viewer: Box<dyn StageViewer>,
    sampler: Box<dyn InputSource>,
    status: StatusSink,

    bundle: Option<AssetManifest>,
    script_loaded: bool,
    local_start: bool,
    peer_start: bool,

    accumulator: f64,
    last_timestamp: Option<f64>,
}

impl<A, L, V> Orchestrator<A, L, V>
where
    A: ReliableChannel,
    L: DatagramChannel,
    V: ScriptVm,
{
    pub fn new(
        asset_channel: A,
        live_channel: L,
        global_vm: V,
        side: PlayerSide,
        viewer: Box<dyn StageViewer>,
        sampler: Box<dyn InputSource>,
        status: StatusSink,
    ) -> Self {
        let store = Rc::new(RefCell::new(ContentStore::new()));
        let rollback = Rc::new(RefCell::new(RollbackEngine::new(
            GameState::seed(),
            global_vm.instantiate(),
            global_vm.instantiate(),
            side,
        )));
        Self {
            assets: AssetExchange::new(asset_channel, store.clone()),
            live: LiveChannel::new(live_channel, rollback.clone()),
            rollback,
            store,
            global_vm,
            side,
            viewer,
            sampler,
            status,
            bundle: None,
            script_loaded: false,
            local_start: false,
            peer_start: false,
            accumulator: 0.0,
            last_timestamp: None,
        }
    }

    pub fn phase(&self) -> Phase {
        let loaded = self.bundle.is_some() && self.script_loaded;
        if loaded {
            if self.local_start || self.peer_start {
                Phase::Running
            } else {
                Phase::Armed
            }
        } else if self.bundle.is_some() || self.script_loaded || self.assets.is_awaiting() {
            Phase::Loading
        } else {
            Phase::Idle
        }
    }

    pub fn latest_frame(&self) -> u16 {
        self.rollback.borrow().latest_frame()
    }

    pub fn store(&self) -> Rc<RefCell<ContentStore>> {
        self.store.clone()
    }

    // ── Transport plumbing ──────────────────────────────────────────

    pub fn on_asset_frame(&mut self, data: &[u8]) {
        self.assets.on_frame(data);
        self.drain_asset_events();
    }

    pub fn on_live_frame(&mut self, data: &[u8]) {
        self.live.on_frame(data);
    }

    pub fn on_buffered_low(&mut self) {
        self.assets.on_buffered_low();
    }

    pub fn on_channel_open(&mut self) {
        self.assets.on_channel_open();
    }

    // ── Operator surface ────────────────────────────────────────────

    /// Ingest one chunk of a bundle under construction. Returns its hash.
    pub fn stage_chunk(&mut self, bytes: Vec<u8>) -> String {
        let hash = ContentStore::hash_of(&bytes);
        self.store.borrow_mut().put(&hash, bytes);
        hash
    }

    /// Announce a bundle whose chunks were previously staged. The local
    /// viewer gets the bundle immediately; the peer fetches what it lacks.
    pub fn announce_bundle(
        &mut self,
        id: &str,
        kind: BundleKind,
        entry: &str,
        chunks: Vec<ChunkEntry>,
        atlas: Option<String>,
    ) {
        let meta = atlas.map(|hash| {
            let mut m = std::collections::BTreeMap::new();
            m.insert("atlas".to_string(), hash);
            m
        });
        let manifest = AssetManifest {
            id: id.to_string(),
            kind,
            entry: entry.to_string(),
            chunks,
            meta,
        };
        if let Err(err) = manifest.validate() {
            (self.status)(&format!("bundle rejected: {err}"));
            return;
        }
        self.assets.announce(&manifest);
        self.adopt_bundle(manifest);
    }

    /// Compile a script into the global VM and re-seed the match under it.
    pub fn load_script(&mut self, name: &str, source: &[u8]) {
        let Ok(text) = std::str::from_utf8(source) else {
            (self.status)(&format!("script {name}: not valid UTF-8"));
            return;
        };
        if !self.global_vm.load_source(text) {
            let detail = self
                .global_vm
                .take_last_error()
                .unwrap_or_else(|| "unknown error".to_string());
            (self.status)(&format!("script {name}: {detail}"));
            return;
        }
        tracing::info!(name, bytes = source.len(), "script loaded");
        self.script_loaded = true;
        self.reseed();
    }

    /// Ship the script to the peer. The peer re-seeds on receipt; pairing
    /// this with a local `load_script` keeps both sides on the same logic.
    pub fn push_script(&mut self, name: &str, source: &[u8]) {
        self.assets.push_script(name, source);
    }

    /// Arm the match locally and tell the peer.
    pub fn request_start(&mut self) {
        self.local_start = true;
        self.assets.send_game_start();
    }

    // ── Tick loop ───────────────────────────────────────────────────

    /// Drive the runtime from an animation-frame timestamp. Runs as many
    /// fixed ticks as wall time owes; while gating conditions are unmet
    /// the accumulator stays at zero so no backlog builds up.
    pub fn on_animation_frame(&mut self, timestamp_ms: f64) {
        let delta = match self.last_timestamp {
            Some(last) => (timestamp_ms - last).clamp(0.0, MAX_DELTA_MS),
            None => 0.0,
        };
        self.last_timestamp = Some(timestamp_ms);

        self.drain_asset_events();
        if self.phase() != Phase::Running {
            self.accumulator = 0.0;
            return;
        }

        self.accumulator += delta;
        while self.accumulator >= TICK_MS {
            self.tick();
            self.accumulator -= TICK_MS;
        }
    }

    fn tick(&mut self) {
        let mask = self.sampler.sample();
        let mut rollback = self.rollback.borrow_mut();
        let next = rollback.latest_frame().wrapping_add(1);
        rollback.set_local_input(next, mask);
        rollback.simulate_to(next);
        let snapshot = rollback.latest();
        drop(rollback);

        self.viewer.present(&snapshot);
        self.live.send_input(next, mask);
        if next % HASH_INTERVAL == 0 {
            self.live
                .send_state_hash(next, state_fingerprint(&snapshot));
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn drain_asset_events(&mut self) {
        while let Some(event) = self.assets.poll_event() {
            match event {
                AssetEvent::BundleReady(manifest) => self.adopt_bundle(manifest),
                AssetEvent::ScriptReceived { name, source } => {
                    self.load_script(&name, &source);
                }
                AssetEvent::PeerStarted => {
                    tracing::info!("peer armed the match");
                    self.peer_start = true;
                }
            }
        }
    }

    fn adopt_bundle(&mut self, manifest: AssetManifest) {
        self.viewer.show_bundle(&manifest, &self.store.borrow());
        self.bundle = Some(manifest);
    }

    /// Replace the rollback engine with a fresh one at frame zero. The
    /// live engine's handle stays valid because the engine is swapped
    /// inside the shared cell.
    fn reseed(&mut self) {
        let fresh = RollbackEngine::new(
            GameState::seed(),
            self.global_vm.instantiate(),
            self.global_vm.instantiate(),
            self.side,
        );
        *self.rollback.borrow_mut() = fresh;
        self.accumulator = 0.0;
        tracing::info!("rollback engine re-seeded at frame 0");
    }
}
