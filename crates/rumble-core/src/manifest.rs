//! Asset bundle manifests and the sprite atlas sheet.
//!
//! A manifest enumerates the content-addressed chunks of one character
//! bundle. It travels as UTF-8 JSON on the asset channel; assembly is
//! simply "every listed hash is present in the store".

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cas::{ContentStore, HASH_PREFIX};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("chunk hash {0:?} is not of the form sha256:<64 hex chars>")]
    BadHash(String),
    #[error("sprite bundle has no meta.atlas entry")]
    MissingAtlas,
    #[error("meta.atlas {0:?} names no chunk in the list")]
    UnknownAtlas(String),
}

/// Bundle flavor; the viewer picks its loader from this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleKind {
    #[default]
    Mesh,
    Sprite,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// `sha256:<64 hex chars>` key of the payload.
    pub hash: String,
    /// Payload length in bytes.
    pub size: u32,
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: BundleKind,
    /// Hash of the chunk the viewer starts loading from.
    pub entry: String,
    pub chunks: Vec<ChunkEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, String>>,
}

impl AssetManifest {
    /// Hash of the atlas chunk, for sprite bundles.
    pub fn atlas_hash(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|m| m.get("atlas"))
            .map(String::as_str)
    }

    /// Structural invariants: well-formed hashes, and for sprites an
    /// atlas entry naming a listed chunk.
    pub fn validate(&self) -> Result<(), ManifestError> {
        for chunk in &self.chunks {
            let hex = chunk
                .hash
                .strip_prefix(HASH_PREFIX)
                .ok_or_else(|| ManifestError::BadHash(chunk.hash.clone()))?;
            if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ManifestError::BadHash(chunk.hash.clone()));
            }
        }
        if self.kind == BundleKind::Sprite {
            let atlas = self.atlas_hash().ok_or(ManifestError::MissingAtlas)?;
            if !self.chunks.iter().any(|c| c.hash == atlas) {
                return Err(ManifestError::UnknownAtlas(atlas.to_string()));
            }
        }
        Ok(())
    }

    /// Chunk hashes not yet present in the store.
    pub fn missing_chunks(&self, store: &ContentStore) -> Vec<String> {
        self.chunks
            .iter()
            .filter(|c| !store.has(&c.hash))
            .map(|c| c.hash.clone())
            .collect()
    }

    /// A bundle is assembled once every listed hash is in the store; a
    /// sprite bundle additionally needs its atlas chunk.
    pub fn is_complete(&self, store: &ContentStore) -> bool {
        self.chunks.iter().all(|c| store.has(&c.hash))
            && self.atlas_hash().is_none_or(|a| store.has(a))
    }
}

/// Atlas JSON carried as a chunk payload for sprite bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasSheet {
    pub cell_width: i32,
    pub cell_height: i32,
    pub anims: HashMap<String, AtlasAnim>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasAnim {
    pub from: i32,
    pub to: i32,
    pub fps: i32,
    #[serde(rename = "loop")]
    pub looped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(payload: &[u8], mime: &str) -> ChunkEntry {
        ChunkEntry {
            hash: ContentStore::hash_of(payload),
            size: payload.len() as u32,
            mime: mime.to_string(),
        }
    }

    fn sprite_manifest() -> AssetManifest {
        let sheet = chunk(b"png bytes", "image/png");
        let atlas = chunk(b"{\"cellWidth\":32}", "application/json");
        let mut meta = BTreeMap::new();
        meta.insert("atlas".to_string(), atlas.hash.clone());
        AssetManifest {
            id: "ryu".to_string(),
            kind: BundleKind::Sprite,
            entry: sheet.hash.clone(),
            chunks: vec![sheet, atlas],
            meta: Some(meta),
        }
    }

    #[test]
    fn type_defaults_to_mesh() {
        let m: AssetManifest = serde_json::from_str(
            r#"{"id":"a","entry":"sha256:00","chunks":[]}"#,
        )
        .unwrap();
        assert_eq!(m.kind, BundleKind::Mesh);
        assert!(m.meta.is_none());
    }

    #[test]
    fn validate_accepts_wellformed_sprite() {
        assert_eq!(sprite_manifest().validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_short_hash() {
        let mut m = sprite_manifest();
        m.chunks[0].hash = "sha256:abcd".to_string();
        assert!(matches!(m.validate(), Err(ManifestError::BadHash(_))));
    }

    #[test]
    fn validate_rejects_sprite_without_atlas() {
        let mut m = sprite_manifest();
        m.meta = None;
        assert_eq!(m.validate(), Err(ManifestError::MissingAtlas));
    }

    #[test]
    fn validate_rejects_unlisted_atlas() {
        let mut m = sprite_manifest();
        m.meta
            .as_mut()
            .unwrap()
            .insert("atlas".to_string(), ContentStore::hash_of(b"elsewhere"));
        assert!(matches!(m.validate(), Err(ManifestError::UnknownAtlas(_))));
    }

    #[test]
    fn completion_tracks_the_store() {
        let m = sprite_manifest();
        let mut store = ContentStore::new();
        assert_eq!(m.missing_chunks(&store).len(), 2);
        assert!(!m.is_complete(&store));

        store.put(&m.chunks[0].hash, b"png bytes".to_vec());
        assert_eq!(m.missing_chunks(&store), vec![m.chunks[1].hash.clone()]);

        store.put(&m.chunks[1].hash, b"{\"cellWidth\":32}".to_vec());
        assert!(m.is_complete(&store));
    }

    #[test]
    fn atlas_sheet_json_field_names() {
        let json = r#"{
            "cellWidth": 64,
            "cellHeight": 64,
            "anims": {
                "idle": {"from": 0, "to": 3, "fps": 8, "loop": true}
            }
        }"#;
        let sheet: AtlasSheet = serde_json::from_str(json).unwrap();
        assert_eq!(sheet.cell_width, 64);
        let idle = &sheet.anims["idle"];
        assert_eq!(idle.to, 3);
        assert!(idle.looped);
    }
}
