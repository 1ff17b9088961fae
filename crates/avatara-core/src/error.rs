//! Error types for Avatara

use thiserror::Error;

use crate::ParticipantIdentity;

/// Core Avatara errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AvataraError {
    // Tracking errors
    #[error("Landmark worker error: {0}")]
    Worker(String),

    #[error("Landmark worker is not running")]
    WorkerUnavailable,

    #[error("Detector disposed")]
    DetectorDisposed,

    #[error("Detector initialization failed: {0}")]
    InitFailed(String),

    // Codec errors
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Identity mismatch: record for {record} sent by {caller}")]
    IdentityMismatch {
        caller: ParticipantIdentity,
        record: ParticipantIdentity,
    },

    // RPC errors
    #[error("RPC method not registered: {0}")]
    MethodNotRegistered(String),

    #[error("RPC to {destination} failed: {reason}")]
    RpcFailed {
        destination: ParticipantIdentity,
        reason: String,
    },

    // Placement errors
    #[error("No placement in progress for {0}")]
    NoPlacementHandler(ParticipantIdentity),

    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    #[error("Scene error: {0}")]
    Scene(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for Avatara operations
pub type AvataraResult<T> = Result<T, AvataraError>;
