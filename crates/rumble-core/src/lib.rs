//! Rumble core library
//!
//! Deterministic two-player fighter simulation: fixed-point state, a
//! sandboxed per-player script VM, and input-synchronized rollback.
//! Everything here is bit-exact across peers; the same seed and input
//! trace produce the same sequence of states on every machine, which is
//! what lets two browsers co-simulate a match with no server.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

pub mod cas;
pub mod fixed;
pub mod hash;
pub mod input;
pub mod manifest;
pub mod rollback;
pub mod script;
pub mod state;
pub mod step;

pub use cas::ContentStore;
pub use hash::{hash32, state_fingerprint};
pub use manifest::{AssetManifest, AtlasAnim, AtlasSheet, BundleKind, ChunkEntry};
pub use rollback::{frame_distance, PlayerSide, RollbackEngine, HISTORY_LEN};
pub use script::{Command, RhaiVm, ScriptVm};
pub use state::{Fighter, GameState};
