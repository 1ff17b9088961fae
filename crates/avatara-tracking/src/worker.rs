//! Landmark worker - model inference isolated on its own thread
//!
//! The worker owns the landmarker for its whole lifetime. It never touches
//! scene state; it only sees bitmaps and produces landmark results. Every
//! failure, including a panic inside the model, comes back as a typed
//! `WorkerResponse::Error` instead of taking the thread down.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;

use avatara_core::{AvataraError, AvataraResult};

use crate::{
    DetectionResult, DetectorKind, LandmarkFrame, LandmarkerOptions, WorkerRequest,
    WorkerResponse,
};

/// A loaded vision model
pub trait Landmarker: Send {
    /// Run inference on one frame
    fn detect(&mut self, frame: &LandmarkFrame) -> AvataraResult<DetectionResult>;

    /// Release the inference session
    fn close(&mut self) {}
}

/// Loads runtime + model inside the worker thread
pub trait LandmarkerLoader: Send + Sync + 'static {
    fn load(&self, options: &LandmarkerOptions) -> AvataraResult<Box<dyn Landmarker>>;
}

/// Response channel returned alongside a spawned worker
pub type WorkerResponses = mpsc::UnboundedReceiver<WorkerResponse>;

/// Handle to a running landmark worker thread
pub struct LandmarkWorker {
    requests: mpsc::UnboundedSender<WorkerRequest>,
}

impl LandmarkWorker {
    /// Start a worker thread for `kind`
    pub fn spawn(
        kind: DetectorKind,
        loader: Arc<dyn LandmarkerLoader>,
    ) -> AvataraResult<(Self, WorkerResponses)> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name(format!("{}-landmarker", kind.name()))
            .spawn(move || run_worker(loader, request_rx, response_tx))
            .map_err(|e| AvataraError::Worker(e.to_string()))?;

        Ok((
            LandmarkWorker {
                requests: request_tx,
            },
            response_rx,
        ))
    }

    /// Post a request. Detect requests move their bitmap into the worker.
    pub fn post(&self, request: WorkerRequest) -> AvataraResult<()> {
        self.requests
            .send(request)
            .map_err(|_| AvataraError::WorkerUnavailable)
    }
}

fn run_worker(
    loader: Arc<dyn LandmarkerLoader>,
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    responses: mpsc::UnboundedSender<WorkerResponse>,
) {
    let mut landmarker: Option<Box<dyn Landmarker>> = None;

    while let Some(request) = requests.blocking_recv() {
        let response = match request {
            WorkerRequest::Init(options) => {
                match guarded(|| loader.load(&options)) {
                    Ok(loaded) => {
                        if let Some(mut previous) = landmarker.replace(loaded) {
                            previous.close();
                        }
                        WorkerResponse::InitDone
                    }
                    Err(message) => WorkerResponse::Error { message },
                }
            }
            WorkerRequest::Detect(frame) => {
                let Some(model) = landmarker.as_mut() else {
                    tracing::debug!(ts = ?frame.timestamp, "detect before init, frame dropped");
                    frame.bitmap.close();
                    continue;
                };

                let outcome = guarded(|| model.detect(&frame));
                frame.bitmap.close();

                match outcome {
                    Ok(result) => WorkerResponse::Result(result),
                    Err(message) => WorkerResponse::Error { message },
                }
            }
            WorkerRequest::Dispose => {
                if let Some(mut model) = landmarker.take() {
                    model.close();
                }
                break;
            }
        };

        if responses.send(response).is_err() {
            break; // Facade dropped
        }
    }

    if let Some(mut model) = landmarker.take() {
        model.close();
    }
}

/// Run a model call, converting both errors and panics into a message
fn guarded<T>(f: impl FnOnce() -> AvataraResult<T>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "landmarker panicked".to_string()
    }
}
