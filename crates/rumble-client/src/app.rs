//! Browser entry points and the operator surface.
//!
//! `FighterSession` is the thin wrapper the page scripts talk to: paste
//! session descriptions, stage and announce bundles, load or push scripts,
//! arm the match. Everything of substance happens in the orchestrator.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use rumble_core::{BundleKind, ChunkEntry, PlayerSide, RhaiVm};

use crate::config::RuntimeConfig;
use crate::orchestrator::Orchestrator;
use crate::sampler::{InputSource, KeyboardSampler, NullInput};
use crate::session::PeerSession;
use crate::transport::ChannelSlot;
use crate::viewer::ObjectUrlViewer;
use crate::Runtime;

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

static INIT_TRACING: Once = Once::new();

fn init_tracing(filter: &str) {
    INIT_TRACING.call_once(|| {
        let level = match filter {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        };
        let config = tracing_wasm::WASMLayerConfigBuilder::new()
            .set_max_level(level)
            .build();
        tracing_wasm::set_as_global_default_with_config(config);
    });
}

/// One peer's runtime, exported to the page.
#[wasm_bindgen]
pub struct FighterSession {
    runtime: Rc<RefCell<Runtime>>,
    session: PeerSession,
    staged: Vec<ChunkEntry>,
    config: RuntimeConfig,
}

#[wasm_bindgen]
impl FighterSession {
    /// Create the runtime. `player` is 1 or 2 and must differ between the
    /// peers; `on_status` receives user-visible failure strings.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        player: u8,
        on_status: Option<js_sys::Function>,
    ) -> Result<FighterSession, JsValue> {
        let config = match config_json.as_deref() {
            Some(json) => RuntimeConfig::from_json(json)
                .map_err(|e| JsValue::from_str(&format!("bad config: {e}")))?,
            None => RuntimeConfig::default(),
        };
        init_tracing(&config.log_filter);

        let side = if player == 2 {
            PlayerSide::Two
        } else {
            PlayerSide::One
        };
        let sampler: Box<dyn InputSource> = match KeyboardSampler::attach() {
            Some(keyboard) => Box::new(keyboard),
            None => Box::new(NullInput),
        };
        let status: Box<dyn Fn(&str)> = Box::new(move |message: &str| {
            tracing::warn!(message, "status");
            if let Some(callback) = on_status.as_ref() {
                let _ = callback.call1(&JsValue::NULL, &JsValue::from_str(message));
            }
        });

        let asset_slot = ChannelSlot::new();
        let live_slot = ChannelSlot::new();
        let runtime = Rc::new(RefCell::new(Orchestrator::new(
            asset_slot.clone(),
            live_slot.clone(),
            RhaiVm::new(),
            side,
            Box::new(ObjectUrlViewer::new()),
            sampler,
            status,
        )));
        let session = PeerSession::new(&config.stun_url, runtime.clone(), asset_slot, live_slot)?;

        start_frame_loop(runtime.clone());
        tracing::info!(player, stun = %config.stun_url, "fighter session created");

        Ok(FighterSession {
            runtime,
            session,
            staged: Vec::new(),
            config,
        })
    }

    /// Sprite sheet the page falls back to when no file is selected.
    pub fn default_sprite_path(&self) -> String {
        self.config.default_sprite_path.clone()
    }

    /// Atlas paired with the default sprite sheet.
    pub fn default_atlas_path(&self) -> String {
        self.config.default_atlas_path.clone()
    }

    /// Begin as the offering side; the local description arrives through
    /// `set_on_local_description` once gathering settles.
    pub fn offer(&self) {
        self.session.offer();
    }

    /// Paste the remote peer's session description.
    pub fn accept_remote(&self, sdp: String) {
        self.session.accept_remote(sdp);
    }

    pub fn set_on_local_description(&self, callback: js_sys::Function) {
        self.session.set_on_local_description(callback);
    }

    pub fn local_description(&self) -> Option<String> {
        self.session.local_description()
    }

    /// Ingest one chunk of the bundle under construction; returns its
    /// content hash for use as `entry` or the atlas reference.
    pub fn stage_chunk(&mut self, bytes: &[u8], mime: String) -> String {
        let hash = self.runtime.borrow_mut().stage_chunk(bytes.to_vec());
        self.staged.push(ChunkEntry {
            hash: hash.clone(),
            size: bytes.len() as u32,
            mime,
        });
        hash
    }

    /// Announce the staged chunks as one bundle. `kind` is "mesh" or
    /// "sprite"; sprites name their atlas chunk.
    pub fn announce_bundle(
        &mut self,
        id: String,
        kind: String,
        entry: String,
        atlas: Option<String>,
    ) {
        let kind = if kind == "sprite" {
            BundleKind::Sprite
        } else {
            BundleKind::Mesh
        };
        let chunks = std::mem::take(&mut self.staged);
        self.runtime
            .borrow_mut()
            .announce_bundle(&id, kind, &entry, chunks, atlas);
    }

    /// Compile a script locally and re-seed the match under it.
    pub fn load_script(&self, name: String, source: String) {
        self.runtime
            .borrow_mut()
            .load_script(&name, source.as_bytes());
    }

    /// Ship a script to the peer on the asset channel.
    pub fn push_script(&self, name: String, source: String) {
        self.runtime
            .borrow_mut()
            .push_script(&name, source.as_bytes());
    }

    /// Arm the match locally and signal the peer.
    pub fn start_game(&self) {
        self.runtime.borrow_mut().request_start();
    }

    pub fn frame(&self) -> u16 {
        self.runtime.borrow().latest_frame()
    }

    pub fn phase(&self) -> String {
        format!("{:?}", self.runtime.borrow().phase()).to_lowercase()
    }
}

/// Drive the orchestrator from the browser's animation frames. The
/// closure re-arms itself; the cycle keeps the loop alive for the page's
/// lifetime.
fn start_frame_loop(runtime: Rc<RefCell<Runtime>>) {
    let handle: Rc<RefCell<Option<Closure<dyn FnMut(f64)>>>> = Rc::new(RefCell::new(None));
    let rearm = handle.clone();

    *handle.borrow_mut() = Some(Closure::new(move |timestamp: f64| {
        runtime.borrow_mut().on_animation_frame(timestamp);
        if let Some(window) = web_sys::window() {
            if let Some(closure) = rearm.borrow().as_ref() {
                let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
            }
        }
    }));

    if let Some(window) = web_sys::window() {
        if let Some(closure) = handle.borrow().as_ref() {
            let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        }
    }
}
