//! Runtime configuration for the client.

use serde::{Deserialize, Serialize};

pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

/// Knobs the orchestrator consumes at startup. Everything has a default so
/// the runtime boots from an empty config object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// STUN server used while gathering session candidates.
    pub stun_url: String,
    /// `tracing` directive string, e.g. "info" or "rumble_client=debug".
    pub log_filter: String,
    /// Fallback sprite sheet when the operator selects no file.
    pub default_sprite_path: String,
    /// Fallback atlas for the default sprite sheet.
    pub default_atlas_path: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stun_url: DEFAULT_STUN_URL.to_string(),
            log_filter: "info".to_string(),
            default_sprite_path: "assets/fighter-sheet.png".to_string(),
            default_atlas_path: "assets/fighter-atlas.json".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
        assert_eq!(cfg.stun_url, DEFAULT_STUN_URL);
    }

    #[test]
    fn partial_override_keeps_the_rest() {
        let cfg = RuntimeConfig::from_json(r#"{"stun_url":"stun:example.org:3478"}"#).unwrap();
        assert_eq!(cfg.stun_url, "stun:example.org:3478");
        assert_eq!(cfg.log_filter, "info");
    }
}
