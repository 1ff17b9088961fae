//! Time primitives for detector input
//!
//! Landmark models running in video mode require a strictly increasing
//! timestamp per detector instance. `FrameClock` enforces that even when the
//! wall clock stalls or two frames are captured within the same millisecond.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Frame timestamp in milliseconds since the detector's clock origin
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameTimestamp(pub u64);

impl FrameTimestamp {
    pub const ZERO: FrameTimestamp = FrameTimestamp(0);

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        FrameTimestamp(millis)
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for FrameTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({}ms)", self.0)
    }
}

/// Monotonic frame clock, one per detector instance
#[derive(Debug)]
pub struct FrameClock {
    origin: Instant,
    last: Option<FrameTimestamp>,
}

impl FrameClock {
    pub fn new() -> Self {
        FrameClock {
            origin: Instant::now(),
            last: None,
        }
    }

    /// Timestamp for a frame captured now
    pub fn next(&mut self) -> FrameTimestamp {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        self.next_from(elapsed)
    }

    /// Timestamp for a frame captured at `millis`, bumped forward if it
    /// would not be strictly greater than the previous one
    pub fn next_from(&mut self, millis: u64) -> FrameTimestamp {
        let ts = match self.last {
            Some(last) if millis <= last.0 => FrameTimestamp(last.0 + 1),
            _ => FrameTimestamp(millis),
        };
        self.last = Some(ts);
        ts
    }

    pub fn last(&self) -> Option<FrameTimestamp> {
        self.last
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
