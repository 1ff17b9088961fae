//! Runtime configuration
//!
//! Loaded from JSON. Every section and every field is optional and falls
//! back to its default; unknown fields are rejected.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use avatara_core::{AvataraError, AvataraResult};
use avatara_tracking::{DetectorConfig, DetectorKind};
use avatara_visual::{AvatarConfig, RetargetConfig};

/// Detector setup, one instance per landmarker kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingConfig {
    pub face: DetectorConfig,
    pub pose: DetectorConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        TrackingConfig {
            face: DetectorConfig::face(),
            pose: DetectorConfig::pose(),
        }
    }
}

/// Outbound replication settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Pipeline tick period
    pub tick_interval_ms: u64,
    /// Morph influences at or below this are not sent
    pub morph_epsilon: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            tick_interval_ms: 33,
            morph_epsilon: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub tracking: TrackingConfig,
    pub retarget: RetargetConfig,
    pub avatar: AvatarConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> AvataraResult<Self> {
        let config: RuntimeConfig =
            serde_json::from_str(json).map_err(|e| AvataraError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> AvataraResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| AvataraError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> AvataraResult<()> {
        if self.tracking.face.kind != DetectorKind::Face {
            return Err(AvataraError::Config("tracking.face must be a face detector".into()));
        }
        if self.tracking.pose.kind != DetectorKind::Pose {
            return Err(AvataraError::Config("tracking.pose must be a pose detector".into()));
        }
        if self.sync.tick_interval_ms == 0 {
            return Err(AvataraError::Config("sync.tick_interval_ms must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.sync.morph_epsilon) {
            return Err(AvataraError::Config("sync.morph_epsilon must be in [0, 1)".into()));
        }

        let r = &self.retarget;
        if !(r.damping > 0.0 && r.damping <= 1.0) {
            return Err(AvataraError::Config("retarget.damping must be in (0, 1]".into()));
        }
        if !(r.blink_saturation > 0.0 && r.blink_saturation <= 1.0) {
            return Err(AvataraError::Config(
                "retarget.blink_saturation must be in (0, 1]".into(),
            ));
        }
        if !(0.0..1.0).contains(&r.influence_gate) {
            return Err(AvataraError::Config("retarget.influence_gate must be in [0, 1)".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.sync.tick_interval_ms)
    }
}
