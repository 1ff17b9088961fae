//! Scripted landmark models and synthetic video

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use avatara_core::{AvataraError, AvataraResult, Mat4, Quat, Vec3};
use avatara_tracking::{
    pose_index, BlendShapeScore, DetectionResult, FaceResult, ImageBitmap, LandmarkFrame,
    Landmarker, LandmarkerLoader, LandmarkerOptions, PoseLandmark, PoseResult, ReleaseTracker,
    VideoSource,
};

/// Holds detect calls on the worker thread until opened
#[derive(Default)]
struct Gate {
    closed: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut closed = self.closed.lock();
        while *closed {
            self.opened.wait(&mut closed);
        }
    }

    fn set(&self, closed: bool) {
        *self.closed.lock() = closed;
        if !closed {
            self.opened.notify_all();
        }
    }
}

#[derive(Default)]
struct Script {
    queued: Mutex<VecDeque<AvataraResult<DetectionResult>>>,
    fallback: Mutex<Option<DetectionResult>>,
    detect_calls: AtomicUsize,
    loads: AtomicUsize,
    init_failure: Mutex<Option<String>>,
    gate: Gate,
}

/// Loader whose models answer from a shared script
#[derive(Clone, Default)]
pub struct ScriptedLoader {
    script: Arc<Script>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unscripted detect with `result`
    pub fn with_fallback(self, result: DetectionResult) -> Self {
        *self.script.fallback.lock() = Some(result);
        self
    }

    /// Make model loading fail
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.script.init_failure.lock() = Some(message.into());
        self
    }

    pub fn push(&self, result: AvataraResult<DetectionResult>) {
        self.script.queued.lock().push_back(result);
    }

    /// Block detects until `release`
    pub fn hold(&self) {
        self.script.gate.set(true);
    }

    pub fn release(&self) {
        self.script.gate.set(false);
    }

    /// Detect calls that reached a model
    pub fn detect_calls(&self) -> usize {
        self.script.detect_calls.load(Ordering::SeqCst)
    }

    pub fn loads(&self) -> usize {
        self.script.loads.load(Ordering::SeqCst)
    }
}

impl LandmarkerLoader for ScriptedLoader {
    fn load(&self, options: &LandmarkerOptions) -> AvataraResult<Box<dyn Landmarker>> {
        if let Some(message) = self.script.init_failure.lock().clone() {
            return Err(AvataraError::InitFailed(message));
        }
        self.script.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(kind = options.kind.name(), model = %options.model_asset_path, "scripted model loaded");
        Ok(Box::new(ScriptedLandmarker {
            script: Arc::clone(&self.script),
        }))
    }
}

pub struct ScriptedLandmarker {
    script: Arc<Script>,
}

impl Landmarker for ScriptedLandmarker {
    fn detect(&mut self, _frame: &LandmarkFrame) -> AvataraResult<DetectionResult> {
        self.script.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.script.gate.wait();

        if let Some(next) = self.script.queued.lock().pop_front() {
            return next;
        }
        self.script
            .fallback
            .lock()
            .clone()
            .ok_or_else(|| AvataraError::Worker("no scripted result".into()))
    }
}

/// Camera stand-in producing seeded noise frames
pub struct SyntheticVideoSource {
    width: u32,
    height: u32,
    live: AtomicBool,
    captured: AtomicUsize,
    rng: Mutex<StdRng>,
    tracker: ReleaseTracker,
}

impl SyntheticVideoSource {
    pub fn new(width: u32, height: u32, seed: u64) -> Self {
        Self {
            width,
            height,
            live: AtomicBool::new(true),
            captured: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            tracker: ReleaseTracker::new(),
        }
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::SeqCst);
    }

    /// Frames handed out so far
    pub fn captured(&self) -> usize {
        self.captured.load(Ordering::SeqCst)
    }

    /// Frames closed by whoever received them
    pub fn released(&self) -> usize {
        self.tracker.released()
    }
}

impl VideoSource for SyntheticVideoSource {
    fn has_active_stream(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn capture_frame(&self) -> Option<ImageBitmap> {
        if !self.has_active_stream() {
            return None;
        }
        let len = (self.width * self.height * 4) as usize;
        let mut pixels = vec![0u8; len];
        self.rng.lock().fill(&mut pixels[..]);
        self.captured.fetch_add(1, Ordering::SeqCst);
        Some(ImageBitmap::new(self.width, self.height, pixels).with_tracker(self.tracker.clone()))
    }
}

/// Face result with the given blend shapes and head yaw
pub fn face_result(shapes: &[(&str, f32)], yaw: f32) -> FaceResult {
    FaceResult {
        blend_shapes: shapes
            .iter()
            .map(|(name, score)| BlendShapeScore::new(*name, *score))
            .collect(),
        facial_transform: Some(Mat4::from_rotation_translation(
            Quat::from_yaw_pitch_roll(yaw, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -40.0),
        )),
    }
}

/// Upright body with the shoulder line turned by `dz` metres
pub fn pose_result(dz: f32, visibility: f32) -> PoseResult {
    let mut landmarks = vec![PoseLandmark::new(Vec3::ZERO, visibility); pose_index::COUNT];
    landmarks[pose_index::LEFT_SHOULDER] = PoseLandmark::new(Vec3::new(0.18, 0.45, dz), visibility);
    landmarks[pose_index::RIGHT_SHOULDER] =
        PoseLandmark::new(Vec3::new(-0.18, 0.45, -dz), visibility);
    landmarks[pose_index::LEFT_HIP] = PoseLandmark::new(Vec3::new(0.1, 0.0, 0.0), visibility);
    landmarks[pose_index::RIGHT_HIP] = PoseLandmark::new(Vec3::new(-0.1, 0.0, 0.0), visibility);
    PoseResult {
        world_landmarks: landmarks,
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
