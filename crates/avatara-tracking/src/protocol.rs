//! Worker message protocol
//!
//! Requests flow from the detector facade to the worker thread; responses
//! flow back. The bitmap inside a `Detect` request is moved, never copied.

use serde::{Deserialize, Serialize};

use crate::{DetectionResult, LandmarkFrame};

/// Which landmark model a detector drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Face,
    Pose,
}

impl DetectorKind {
    pub fn name(self) -> &'static str {
        match self {
            DetectorKind::Face => "face",
            DetectorKind::Pose => "pose",
        }
    }
}

/// Model running mode, scoped to one detector instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunningMode {
    Image,
    #[default]
    Video,
}

/// Everything the worker needs to load a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandmarkerOptions {
    pub kind: DetectorKind,
    pub wasm_path: String,
    pub model_asset_path: String,
    pub running_mode: RunningMode,
}

/// Facade → worker
#[derive(Debug)]
pub enum WorkerRequest {
    Init(LandmarkerOptions),
    Detect(LandmarkFrame),
    Dispose,
}

impl WorkerRequest {
    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerRequest::Init(_) => "init",
            WorkerRequest::Detect(_) => "detect",
            WorkerRequest::Dispose => "dispose",
        }
    }
}

/// Worker → facade
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    InitDone,
    Result(DetectionResult),
    Error { message: String },
}

impl WorkerResponse {
    pub fn error(message: impl Into<String>) -> Self {
        WorkerResponse::Error {
            message: message.into(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            WorkerResponse::InitDone => "init_done",
            WorkerResponse::Result(_) => "result",
            WorkerResponse::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_names() {
        assert_eq!(WorkerRequest::Dispose.type_name(), "dispose");
        assert_eq!(WorkerResponse::InitDone.type_name(), "init_done");
        assert_eq!(WorkerResponse::error("boom").type_name(), "error");
    }

    #[test]
    fn test_running_mode_is_lowercase_on_the_wire() {
        assert_eq!(serde_json::to_string(&RunningMode::Video).unwrap(), "\"video\"");
        let kind: DetectorKind = serde_json::from_str("\"pose\"").unwrap();
        assert_eq!(kind, DetectorKind::Pose);
    }
}
