//! Avatara Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout Avatara:
//! - Identifiers (ParticipantIdentity, MeshId, MaterialId, AssetId)
//! - Math primitives (Vec3, Quat, Mat4, Transform)
//! - Frame timestamps for detector input
//! - The shared error type

pub mod error;
pub mod id;
pub mod math;
pub mod time;

pub use error::*;
pub use id::*;
pub use math::*;
pub use time::*;
