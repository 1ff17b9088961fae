//! Avatara Tracking - Landmark inference off the interactive thread
//!
//! This crate provides:
//! - Frame and bitmap types with move-only transfer into the worker
//! - Detection results (face blend shapes + transform, pose world landmarks)
//! - The worker message protocol
//! - `LandmarkWorker`: an isolated inference thread
//! - `Detector`: a request/response facade that keeps at most one detect
//!   request in flight and drops overlapping calls

pub mod detector;
pub mod frame;
pub mod protocol;
pub mod result;
pub mod worker;

pub use detector::*;
pub use frame::*;
pub use protocol::*;
pub use result::*;
pub use worker::*;
