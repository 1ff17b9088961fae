//! Avatara Visual - From landmarks to a moving avatar
//!
//! Tracking output is turned into avatar-space values here:
//!
//! Landmarks → Retargeter → RetargetedPose → Avatar (bones + morphs)
//!
//! The retargeter is pure; it never touches the skeleton. The avatar
//! damps toward each new target so irregular detection intervals do not
//! show up as snapping. Animation playback, including three-part
//! continuous interactions, is driven by `AnimationController`.

pub mod animation;
pub mod avatar;
pub mod retarget;
pub mod skeleton;

pub use animation::*;
pub use avatar::*;
pub use retarget::*;
pub use skeleton::*;
