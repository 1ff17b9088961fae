//! Frame input for landmark detection
//!
//! An `ImageBitmap` is moved into the worker together with its timestamp.
//! Once handed over, the caller no longer owns it; the worker closes it
//! right after inference.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use avatara_core::FrameTimestamp;

/// Counts bitmaps released by the worker
#[derive(Debug, Clone, Default)]
pub struct ReleaseTracker {
    released: Arc<AtomicUsize>,
}

impl ReleaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Owned RGBA image captured from the video source
pub struct ImageBitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    tracker: Option<ReleaseTracker>,
}

impl ImageBitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
            tracker: None,
        }
    }

    /// Blank bitmap of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; (width * height * 4) as usize])
    }

    /// Report the release of this bitmap to `tracker`
    pub fn with_tracker(mut self, tracker: ReleaseTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Release the pixel buffer. Consumes the bitmap.
    pub fn close(self) {
        if let Some(tracker) = &self.tracker {
            tracker.record();
        }
    }
}

impl fmt::Debug for ImageBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageBitmap({}x{})", self.width, self.height)
    }
}

/// One detection cycle's input
#[derive(Debug)]
pub struct LandmarkFrame {
    pub bitmap: ImageBitmap,
    pub timestamp: FrameTimestamp,
}

impl LandmarkFrame {
    pub fn new(bitmap: ImageBitmap, timestamp: FrameTimestamp) -> Self {
        Self { bitmap, timestamp }
    }
}

/// Camera or video element the detector samples from
pub trait VideoSource: Send + Sync {
    /// Whether a live stream is attached
    fn has_active_stream(&self) -> bool;

    /// Capture the current frame as a new bitmap
    fn capture_frame(&self) -> Option<ImageBitmap>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reports_release() {
        let tracker = ReleaseTracker::new();
        let a = ImageBitmap::blank(2, 2).with_tracker(tracker.clone());
        let b = ImageBitmap::blank(2, 2).with_tracker(tracker.clone());

        assert_eq!(a.pixels().len(), 16);
        a.close();
        assert_eq!(tracker.released(), 1);
        b.close();
        assert_eq!(tracker.released(), 2);
    }

    #[test]
    fn test_untracked_close_is_silent() {
        ImageBitmap::blank(1, 1).close();
    }
}
