//! Avatara Runtime - Session context and the per-frame pipeline
//!
//! One `Session` is built at startup and owns every long-lived piece: the
//! detectors, the local avatar, the retargeter and the multiplayer router.
//! Each tick runs:
//! 1. Collect finished detections
//! 2. Start the next detection (dropped while one is in flight)
//! 3. Retarget face, or pose when no face arrived, onto the avatar
//! 4. Advance local and remote animation clocks
//! 5. Capture and broadcast the local SyncState while connected

pub mod config;
pub mod logging;
pub mod session;

pub use config::*;
pub use logging::*;
pub use session::*;
