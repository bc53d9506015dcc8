//! Wire codecs for the two peer channels.
//!
//! Every frame starts with a one-byte opcode; all integers are
//! little-endian. Codecs are pure functions with no session state:
//! encoding never fails, decoding returns `None` for anything it cannot
//! read. The asset channel carries manifests, chunks, scripts and control;
//! the live channel carries per-frame inputs and state fingerprints.

use rumble_core::AssetManifest;

/// Message type identifiers.
pub mod opcode {
    pub const MANIFEST: u8 = 0x01;
    pub const NEED_CHUNKS: u8 = 0x02;
    pub const CHUNK: u8 = 0x03;
    pub const INPUT: u8 = 0x10;
    pub const STATE_HASH: u8 = 0x11;
    pub const SCRIPT_PUSH: u8 = 0x20;
    pub const GAME_START: u8 = 0x22;
}

/// Messages on the reliable, ordered asset channel.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetMessage {
    /// Bundle announcement; the payload is the manifest as UTF-8 JSON.
    Manifest(AssetManifest),
    /// Hashes the receiver still needs. An empty list is valid.
    NeedChunks { hashes: Vec<String> },
    /// One whole chunk. `offset` is zero today; the field stays on the
    /// wire so partial chunks can arrive without a format bump.
    Chunk {
        hash: String,
        offset: u32,
        payload: Vec<u8>,
    },
    /// Logic script distributed in-band so both peers observe the same
    /// source before any frame under it is simulated.
    ScriptPush { name: String, body: Vec<u8> },
    /// Control opcode arming the match on the receiving peer.
    GameStart,
}

impl AssetMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            AssetMessage::Manifest(manifest) => {
                let mut buf = vec![opcode::MANIFEST];
                buf.extend_from_slice(&serde_json::to_vec(manifest).unwrap_or_default());
                buf
            }
            AssetMessage::NeedChunks { hashes } => {
                let mut buf = vec![opcode::NEED_CHUNKS];
                buf.extend_from_slice(&(hashes.len() as u16).to_le_bytes());
                for hash in hashes {
                    let bytes = hash.as_bytes();
                    buf.push(bytes.len() as u8);
                    buf.extend_from_slice(bytes);
                }
                buf
            }
            AssetMessage::Chunk {
                hash,
                offset,
                payload,
            } => {
                let mut buf = vec![opcode::CHUNK];
                let hash_bytes = hash.as_bytes();
                buf.push(hash_bytes.len() as u8);
                buf.extend_from_slice(hash_bytes);
                buf.extend_from_slice(&offset.to_le_bytes());
                buf.extend_from_slice(payload);
                buf
            }
            AssetMessage::ScriptPush { name, body } => {
                let mut buf = vec![opcode::SCRIPT_PUSH];
                let name_bytes = name.as_bytes();
                buf.push(name_bytes.len() as u8);
                buf.extend_from_slice(name_bytes);
                buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
                buf.extend_from_slice(body);
                buf
            }
            AssetMessage::GameStart => vec![opcode::GAME_START],
        }
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let (&op, rest) = data.split_first()?;
        match op {
            opcode::MANIFEST => {
                let manifest = serde_json::from_slice(rest).ok()?;
                Some(AssetMessage::Manifest(manifest))
            }
            opcode::NEED_CHUNKS => {
                let count = u16_at(rest, 0)? as usize;
                let mut offset = 2;
                let mut hashes = Vec::with_capacity(count);
                for _ in 0..count {
                    let len = *rest.get(offset)? as usize;
                    offset += 1;
                    let bytes = rest.get(offset..offset + len)?;
                    hashes.push(String::from_utf8_lossy(bytes).into_owned());
                    offset += len;
                }
                Some(AssetMessage::NeedChunks { hashes })
            }
            opcode::CHUNK => {
                let len = *rest.first()? as usize;
                let hash_bytes = rest.get(1..1 + len)?;
                let hash = String::from_utf8_lossy(hash_bytes).into_owned();
                let chunk_offset = u32_at(rest, 1 + len)?;
                let payload = rest.get(1 + len + 4..)?.to_vec();
                Some(AssetMessage::Chunk {
                    hash,
                    offset: chunk_offset,
                    payload,
                })
            }
            opcode::SCRIPT_PUSH => {
                let len = *rest.first()? as usize;
                let name_bytes = rest.get(1..1 + len)?;
                let name = String::from_utf8_lossy(name_bytes).into_owned();
                let body_len = u32_at(rest, 1 + len)? as usize;
                let body = rest.get(1 + len + 4..1 + len + 4 + body_len)?.to_vec();
                Some(AssetMessage::ScriptPush { name, body })
            }
            opcode::GAME_START => Some(AssetMessage::GameStart),
            _ => None,
        }
    }
}

/// Messages on the unordered, no-retransmit live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveMessage {
    /// One frame's input mask plus the latest-confirmed remote frame.
    Input { frame: u16, mask: u16, ack: u16 },
    /// Periodic state fingerprint for desync detection.
    StateHash { frame: u16, hash: u32 },
}

impl LiveMessage {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            LiveMessage::Input { frame, mask, ack } => {
                let mut buf = vec![opcode::INPUT];
                buf.extend_from_slice(&frame.to_le_bytes());
                buf.extend_from_slice(&mask.to_le_bytes());
                buf.extend_from_slice(&ack.to_le_bytes());
                buf
            }
            LiveMessage::StateHash { frame, hash } => {
                let mut buf = vec![opcode::STATE_HASH];
                buf.extend_from_slice(&frame.to_le_bytes());
                buf.extend_from_slice(&hash.to_le_bytes());
                buf
            }
        }
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        let (&op, rest) = data.split_first()?;
        match op {
            opcode::INPUT => Some(LiveMessage::Input {
                frame: u16_at(rest, 0)?,
                mask: u16_at(rest, 2)?,
                ack: u16_at(rest, 4)?,
            }),
            opcode::STATE_HASH => Some(LiveMessage::StateHash {
                frame: u16_at(rest, 0)?,
                hash: u32_at(rest, 2)?,
            }),
            _ => None,
        }
    }
}

fn u16_at(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}
