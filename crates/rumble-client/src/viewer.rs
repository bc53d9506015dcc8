//! Viewer seam.
//!
//! The scene-graph renderer is an external collaborator and a pure
//! consumer of state snapshots: the orchestrator hands it each committed
//! snapshot plus, once per bundle, the manifest and store to pull payloads
//! from. The browser implementation here only manages the object URLs the
//! real renderer loads from; it draws nothing itself.

use std::collections::HashMap;

use rumble_core::{AssetManifest, ContentStore, GameState};

pub trait StageViewer {
    /// An assembled bundle is available; payloads are keyed by hash in
    /// `store`.
    fn show_bundle(&mut self, manifest: &AssetManifest, store: &ContentStore);

    /// Present the latest committed snapshot.
    fn present(&mut self, state: &GameState);
}

/// Viewer that discards everything; used before a renderer is wired up.
pub struct NullViewer;

impl StageViewer for NullViewer {
    fn show_bundle(&mut self, _manifest: &AssetManifest, _store: &ContentStore) {}

    fn present(&mut self, _state: &GameState) {}
}

/// Bridges assembled bundles to a DOM renderer by minting object URLs for
/// the chunk payloads. URLs are revoked when a chunk is replaced and when
/// the viewer is dropped, so every exit path of a load releases them.
#[derive(Default)]
pub struct ObjectUrlViewer {
    urls: HashMap<String, String>,
    latest: Option<GameState>,
}

impl ObjectUrlViewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object URL minted for `hash`, if the bundle carried it.
    pub fn url_for(&self, hash: &str) -> Option<&str> {
        self.urls.get(hash).map(String::as_str)
    }

    pub fn latest(&self) -> Option<&GameState> {
        self.latest.as_ref()
    }

    fn mint_url(bytes: &[u8], mime: &str) -> Option<String> {
        let array = js_sys::Uint8Array::from(bytes);
        let parts = js_sys::Array::of1(&array);
        let options = web_sys::BlobPropertyBag::new();
        options.set_type(mime);
        let blob =
            web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &options).ok()?;
        web_sys::Url::create_object_url_with_blob(&blob).ok()
    }

    fn revoke(url: &str) {
        let _ = web_sys::Url::revoke_object_url(url);
    }
}

impl StageViewer for ObjectUrlViewer {
    fn show_bundle(&mut self, manifest: &AssetManifest, store: &ContentStore) {
        for chunk in &manifest.chunks {
            let Some(bytes) = store.get(&chunk.hash) else {
                continue;
            };
            let Some(url) = Self::mint_url(bytes, &chunk.mime) else {
                tracing::warn!(hash = %chunk.hash, "object URL creation failed");
                continue;
            };
            if let Some(old) = self.urls.insert(chunk.hash.clone(), url) {
                Self::revoke(&old);
            }
        }
        tracing::info!(id = %manifest.id, urls = self.urls.len(), "bundle handed to viewer");
    }

    fn present(&mut self, state: &GameState) {
        self.latest = Some(*state);
    }
}

impl Drop for ObjectUrlViewer {
    fn drop(&mut self) {
        for url in self.urls.values() {
            Self::revoke(url);
        }
    }
}
