//! Avatara Test Harness - Simulators and cross-crate scenarios
//!
//! This crate provides:
//! - An in-memory room network that routes RPCs between participants
//! - A recording scene for placement and highlight assertions
//! - Scripted landmark models and synthetic video sources
//! - End-to-end scenarios over the tracking, visual and sync crates

pub mod room;
pub mod scenarios;
pub mod scene;
pub mod tracking;

pub use room::*;
pub use scenarios::*;
pub use scene::*;
pub use tracking::*;
