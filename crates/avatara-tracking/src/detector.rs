//! Detector facade - request/response over a landmark worker
//!
//! A full inference cycle can take longer than one render frame. Instead of
//! queueing, a `detect()` call made while another one is still pending is
//! dropped: it returns `None` and posts nothing to the worker. Exactly one
//! pending responder is tracked at a time, and it is cleared whenever the
//! worker answers, whether with a result or an error.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use avatara_core::{AvataraError, AvataraResult, FrameClock};

use crate::{
    DetectionResult, DetectorKind, LandmarkFrame, LandmarkWorker, LandmarkerLoader,
    LandmarkerOptions, RunningMode, VideoSource, WorkerRequest, WorkerResponse, WorkerResponses,
};

/// Detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    /// Inference runtime location
    pub wasm_path: String,
    /// Model bundle location
    pub model_asset_path: String,
    #[serde(default)]
    pub running_mode: RunningMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl DetectorConfig {
    pub const DEFAULT_WASM_PATH: &'static str = "/mediapipe/wasm";

    /// Face landmarker defaults
    pub fn face() -> Self {
        DetectorConfig {
            kind: DetectorKind::Face,
            wasm_path: Self::DEFAULT_WASM_PATH.to_string(),
            model_asset_path: "/models/face_landmarker.task".to_string(),
            running_mode: RunningMode::Video,
            enabled: true,
        }
    }

    /// Pose landmarker defaults
    pub fn pose() -> Self {
        DetectorConfig {
            kind: DetectorKind::Pose,
            wasm_path: Self::DEFAULT_WASM_PATH.to_string(),
            model_asset_path: "/models/pose_landmarker_lite.task".to_string(),
            running_mode: RunningMode::Video,
            enabled: true,
        }
    }

    pub fn with_running_mode(mut self, mode: RunningMode) -> Self {
        self.running_mode = mode;
        self
    }

    pub fn options(&self) -> LandmarkerOptions {
        LandmarkerOptions {
            kind: self.kind,
            wasm_path: self.wasm_path.clone(),
            model_asset_path: self.model_asset_path.clone(),
            running_mode: self.running_mode,
        }
    }
}

/// Detector counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectorStats {
    /// Detect messages posted to the worker
    pub requested: u64,
    /// Calls dropped because a request was already pending
    pub dropped: u64,
    /// Calls skipped because the source had no active stream
    pub idle: u64,
    pub completed: u64,
    pub failed: u64,
}

type Responder = oneshot::Sender<AvataraResult<DetectionResult>>;

struct DetectorInner {
    worker: Option<LandmarkWorker>,
    pending: Option<Responder>,
    clock: FrameClock,
    disposed: bool,
    stats: DetectorStats,
}

/// Resolves with the worker's next result, or its error
#[derive(Debug)]
pub struct PendingDetection {
    rx: oneshot::Receiver<AvataraResult<DetectionResult>>,
}

impl Future for PendingDetection {
    type Output = AvataraResult<DetectionResult>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(AvataraError::DetectorDisposed)))
    }
}

/// Single-flight facade over a landmark worker
pub struct Detector {
    kind: DetectorKind,
    source: Arc<dyn VideoSource>,
    inner: Arc<Mutex<DetectorInner>>,
}

impl Detector {
    /// Start a worker, load the model and wait for `init_done`.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn init(
        config: &DetectorConfig,
        loader: Arc<dyn LandmarkerLoader>,
        source: Arc<dyn VideoSource>,
    ) -> AvataraResult<Self> {
        let (worker, mut responses) = LandmarkWorker::spawn(config.kind, loader)?;
        worker.post(WorkerRequest::Init(config.options()))?;

        let failure = match responses.recv().await {
            Some(WorkerResponse::InitDone) => None,
            Some(WorkerResponse::Error { message }) => Some(AvataraError::InitFailed(message)),
            Some(other) => Some(AvataraError::InitFailed(format!(
                "unexpected {} before init_done",
                other.type_name()
            ))),
            None => Some(AvataraError::WorkerUnavailable),
        };
        if let Some(err) = failure {
            let _ = worker.post(WorkerRequest::Dispose);
            tracing::warn!(kind = config.kind.name(), error = %err, "detector init failed");
            return Err(err);
        }

        let inner = Arc::new(Mutex::new(DetectorInner {
            worker: Some(worker),
            pending: None,
            clock: FrameClock::new(),
            disposed: false,
            stats: DetectorStats::default(),
        }));
        tokio::spawn(dispatch_responses(Arc::downgrade(&inner), responses));

        tracing::info!(kind = config.kind.name(), mode = ?config.running_mode, "detector ready");
        Ok(Detector {
            kind: config.kind,
            source,
            inner,
        })
    }

    pub fn kind(&self) -> DetectorKind {
        self.kind
    }

    /// Capture the current frame and post it to the worker.
    ///
    /// Returns `None` without posting anything when a request is already
    /// in flight, the source has no active stream, or the detector has been
    /// disposed.
    pub fn detect(&self) -> Option<PendingDetection> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return None;
        }
        if inner.pending.is_some() {
            inner.stats.dropped += 1;
            tracing::debug!(kind = self.kind.name(), "detect dropped, request in flight");
            return None;
        }
        if !self.source.has_active_stream() {
            inner.stats.idle += 1;
            return None;
        }
        let Some(bitmap) = self.source.capture_frame() else {
            inner.stats.idle += 1;
            return None;
        };

        let timestamp = inner.clock.next();
        let (tx, rx) = oneshot::channel();
        inner.pending = Some(tx);

        let posted = match inner.worker.as_ref() {
            Some(worker) => worker.post(WorkerRequest::Detect(LandmarkFrame::new(bitmap, timestamp))),
            None => Err(AvataraError::WorkerUnavailable),
        };
        match posted {
            Ok(()) => inner.stats.requested += 1,
            Err(err) => {
                inner.stats.failed += 1;
                if let Some(responder) = inner.pending.take() {
                    let _ = responder.send(Err(err));
                }
            }
        }

        Some(PendingDetection { rx })
    }

    /// A request is in flight
    pub fn is_detecting(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    pub fn stats(&self) -> DetectorStats {
        self.inner.lock().stats.clone()
    }

    /// Stop the worker and reject any pending request. Safe to call twice.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;

        if let Some(worker) = inner.worker.take() {
            let _ = worker.post(WorkerRequest::Dispose);
        }
        if let Some(responder) = inner.pending.take() {
            let _ = responder.send(Err(AvataraError::DetectorDisposed));
        }
        tracing::debug!(kind = self.kind.name(), "detector disposed");
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn dispatch_responses(shared: Weak<Mutex<DetectorInner>>, mut responses: WorkerResponses) {
    while let Some(response) = responses.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let mut inner = shared.lock();
        if inner.disposed {
            continue;
        }
        let Some(responder) = inner.pending.take() else {
            tracing::debug!(response = response.type_name(), "unsolicited worker response");
            continue;
        };

        let settled = match response {
            WorkerResponse::Result(result) => {
                inner.stats.completed += 1;
                Ok(result)
            }
            WorkerResponse::Error { message } => {
                inner.stats.failed += 1;
                Err(AvataraError::Worker(message))
            }
            WorkerResponse::InitDone => {
                inner.stats.failed += 1;
                Err(AvataraError::Worker("unexpected init_done".into()))
            }
        };
        let _ = responder.send(settled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FaceResult, ImageBitmap, Landmarker};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct InstantLandmarker;

    impl Landmarker for InstantLandmarker {
        fn detect(&mut self, _frame: &LandmarkFrame) -> AvataraResult<DetectionResult> {
            Ok(DetectionResult::Face(FaceResult::empty()))
        }
    }

    struct BrokenLandmarker;

    impl Landmarker for BrokenLandmarker {
        fn detect(&mut self, _frame: &LandmarkFrame) -> AvataraResult<DetectionResult> {
            Err(AvataraError::Worker("boom".into()))
        }
    }

    struct InstantLoader;

    impl LandmarkerLoader for InstantLoader {
        fn load(&self, options: &LandmarkerOptions) -> AvataraResult<Box<dyn Landmarker>> {
            if options.model_asset_path.is_empty() {
                return Err(AvataraError::InitFailed("empty model path".into()));
            }
            if options.model_asset_path.ends_with("broken.task") {
                return Ok(Box::new(BrokenLandmarker));
            }
            Ok(Box::new(InstantLandmarker))
        }
    }

    struct Camera {
        live: AtomicBool,
    }

    impl VideoSource for Camera {
        fn has_active_stream(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }

        fn capture_frame(&self) -> Option<ImageBitmap> {
            Some(ImageBitmap::blank(8, 8))
        }
    }

    fn camera(live: bool) -> Arc<Camera> {
        Arc::new(Camera {
            live: AtomicBool::new(live),
        })
    }

    #[tokio::test]
    async fn test_detect_resolves_and_clears_flag() {
        let detector = Detector::init(&DetectorConfig::face(), Arc::new(InstantLoader), camera(true))
            .await
            .unwrap();

        let pending = detector.detect().expect("request posted");
        let result = pending.await.unwrap();

        assert!(result.as_face().is_some());
        assert!(!detector.is_detecting());
        assert_eq!(detector.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_worker_error_rejects_and_clears_flag() {
        let mut config = DetectorConfig::face();
        config.model_asset_path = "/models/broken.task".into();
        let detector = Detector::init(&config, Arc::new(InstantLoader), camera(true))
            .await
            .unwrap();

        let err = detector.detect().expect("request posted").await.unwrap_err();

        match err {
            AvataraError::Worker(message) => assert!(message.contains("boom")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!detector.is_detecting());
        assert_eq!(detector.stats().failed, 1);
        assert!(detector.detect().is_some());
    }

    #[tokio::test]
    async fn test_init_failure_rejects() {
        let mut config = DetectorConfig::face();
        config.model_asset_path.clear();

        let err = Detector::init(&config, Arc::new(InstantLoader), camera(true))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AvataraError::InitFailed(_)));
    }

    #[tokio::test]
    async fn test_no_stream_skips_detection() {
        let detector = Detector::init(&DetectorConfig::pose(), Arc::new(InstantLoader), camera(false))
            .await
            .unwrap();

        assert!(detector.detect().is_none());
        assert_eq!(detector.stats().requested, 0);
        assert_eq!(detector.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let detector = Detector::init(&DetectorConfig::face(), Arc::new(InstantLoader), camera(true))
            .await
            .unwrap();

        detector.dispose();
        detector.dispose();

        assert!(detector.is_disposed());
        assert!(detector.detect().is_none());
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: DetectorConfig = serde_json::from_str(
            r#"{"kind":"face","wasm_path":"/w","model_asset_path":"/m.task"}"#,
        )
        .unwrap();

        assert_eq!(config.running_mode, RunningMode::Video);
        assert!(config.enabled);
    }
}
