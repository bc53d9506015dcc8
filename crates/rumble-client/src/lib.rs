//! Rumble client
//!
//! Browser-resident peer-to-peer runtime for the two-player fighter. Two
//! peers connect over WebRTC (session descriptions exchanged by hand),
//! trade character bundles and a logic script on the reliable channel,
//! then co-simulate the match in lockstep with prediction and rollback —
//! no server ever sees a frame.

mod app;
pub mod assets;
pub mod config;
pub mod live;
pub mod orchestrator;
pub mod sampler;
pub mod session;
pub mod transport;
pub mod viewer;

pub use app::FighterSession;
pub use assets::{AssetEvent, AssetExchange, HIGH_WATER, LOW_WATER};
pub use config::RuntimeConfig;
pub use live::{LiveChannel, HASH_INTERVAL};
pub use orchestrator::{Orchestrator, Phase, TICK_MS};
pub use sampler::{InputSource, KeyboardSampler, NullInput};
pub use session::PeerSession;
pub use transport::{ChannelSlot, DatagramChannel, ReliableChannel};
pub use viewer::{NullViewer, ObjectUrlViewer, StageViewer};

/// The concrete runtime the browser session drives.
pub type Runtime = Orchestrator<ChannelSlot, ChannelSlot, rumble_core::RhaiVm>;
