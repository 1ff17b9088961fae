//! Session - the process-wide context and its tick loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use avatara_core::{AvataraResult, ParticipantIdentity};
use avatara_sync::{
    AssetCatalog, AvatarTemplate, BroadcastReport, ConnectionState, EventBus, MultiplayerRouter,
    Room, Scene, SyncState,
};
use avatara_tracking::{
    DetectionResult, Detector, DetectorKind, FaceResult, LandmarkerLoader, PoseResult, VideoSource,
};
use avatara_visual::{AnimationLibrary, Avatar, Completion, Interaction, Retargeter};

use crate::RuntimeConfig;

/// What the outbound half of a tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Room not connected
    #[default]
    Offline,
    Sent(BroadcastReport),
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub face_applied: bool,
    pub torso_applied: bool,
    pub sync: SyncOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub face_updates: u64,
    pub torso_updates: u64,
    pub detection_failures: u64,
    pub syncs_sent: u64,
    pub syncs_skipped: u64,
}

type Detection = AvataraResult<DetectionResult>;

/// Owns the local avatar, the detectors and the router
pub struct Session<R: Room> {
    config: RuntimeConfig,
    identity: ParticipantIdentity,
    router: MultiplayerRouter<R>,
    retargeter: Retargeter,
    avatar: Avatar,
    face: Option<Detector>,
    pose: Option<Detector>,
    detections_tx: mpsc::UnboundedSender<Detection>,
    detections_rx: mpsc::UnboundedReceiver<Detection>,
    latest_face: Option<FaceResult>,
    latest_pose: Option<PoseResult>,
    stats: SessionStats,
}

impl<R: Room> Session<R> {
    pub fn new(
        config: RuntimeConfig,
        room: Arc<R>,
        scene: Arc<dyn Scene>,
        catalog: Arc<AssetCatalog>,
        library: AnimationLibrary,
    ) -> Self {
        let identity = room.local_identity();
        let template = AvatarTemplate::new(config.avatar.clone(), library.clone());
        let router = MultiplayerRouter::new(room, scene, catalog, EventBus::new(), template);
        router.register_handlers();

        let (detections_tx, detections_rx) = mpsc::unbounded_channel();
        Session {
            retargeter: Retargeter::new(config.retarget.clone()),
            avatar: Avatar::new(config.avatar.clone(), library),
            config,
            identity,
            router,
            face: None,
            pose: None,
            detections_tx,
            detections_rx,
            latest_face: None,
            latest_pose: None,
            stats: SessionStats::default(),
        }
    }

    /// Bring up every enabled detector.
    ///
    /// Detectors that load stay active even when another fails; the first
    /// failure is returned.
    pub async fn start_tracking(
        &mut self,
        loader: Arc<dyn LandmarkerLoader>,
        source: Arc<dyn VideoSource>,
    ) -> AvataraResult<()> {
        let configs = [self.config.tracking.face.clone(), self.config.tracking.pose.clone()];
        let mut first_error = None;

        for config in configs.iter().filter(|c| c.enabled) {
            match Detector::init(config, Arc::clone(&loader), Arc::clone(&source)).await {
                Ok(detector) => match config.kind {
                    DetectorKind::Face => self.face = Some(detector),
                    DetectorKind::Pose => self.pose = Some(detector),
                },
                Err(err) => {
                    tracing::warn!(kind = config.kind.name(), error = %err, "tracking unavailable");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn identity(&self) -> &ParticipantIdentity {
        &self.identity
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn router(&self) -> &MultiplayerRouter<R> {
        &self.router
    }

    pub fn avatar(&self) -> &Avatar {
        &self.avatar
    }

    pub fn avatar_mut(&mut self) -> &mut Avatar {
        &mut self.avatar
    }

    pub fn detector(&self, kind: DetectorKind) -> Option<&Detector> {
        match kind {
            DetectorKind::Face => self.face.as_ref(),
            DetectorKind::Pose => self.pose.as_ref(),
        }
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn set_mirrored(&mut self, mirrored: bool) {
        self.retargeter.set_mirrored(mirrored);
    }

    pub fn play(&mut self, interaction: &Interaction) -> Completion {
        self.avatar.play(interaction)
    }

    pub fn end_continuous(&mut self) -> bool {
        self.avatar.end_continuous()
    }

    pub fn on_connection_state(&self, state: ConnectionState) {
        self.router.on_connection_state(state);
    }

    /// Hold a detection result for the next tick; the newest one wins
    pub fn apply_detection(&mut self, result: DetectionResult) {
        match result {
            DetectionResult::Face(face) => self.latest_face = Some(face),
            DetectionResult::Pose(pose) => self.latest_pose = Some(pose),
        }
    }

    fn collect_detections(&mut self) {
        while let Ok(detection) = self.detections_rx.try_recv() {
            match detection {
                Ok(result) => self.apply_detection(result),
                Err(err) => {
                    self.stats.detection_failures += 1;
                    tracing::debug!(error = %err, "detection failed");
                }
            }
        }
    }

    fn request_detections(&self) {
        for detector in [&self.face, &self.pose].into_iter().flatten() {
            if let Some(pending) = detector.detect() {
                let tx = self.detections_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(pending.await);
                });
            }
        }
    }

    /// One pipeline step. `dt` is the time since the previous tick.
    pub async fn tick(&mut self, dt: Duration) -> TickReport {
        self.stats.ticks += 1;
        self.collect_detections();
        self.request_detections();

        let damping = self.config.retarget.damping;
        let mut report = TickReport::default();

        if let Some(face) = self.latest_face.take().filter(|f| !f.is_empty()) {
            let targets = self.retargeter.retarget_face(&face);
            self.avatar.apply_retargeted(&targets, damping);
            self.stats.face_updates += 1;
            report.face_applied = true;
        }
        let pose = self.latest_pose.take();
        if !report.face_applied {
            if let Some(torso) = pose.as_ref().and_then(|p| self.retargeter.torso_rotation(p)) {
                self.avatar.apply_torso(&torso, damping);
                self.stats.torso_updates += 1;
                report.torso_applied = true;
            }
        }

        self.avatar.advance(dt);
        self.router.advance_remote(dt);

        report.sync = self.sync().await;
        report
    }

    async fn sync(&mut self) -> SyncOutcome {
        if !self.router.room().connection_state().is_connected() {
            self.stats.syncs_skipped += 1;
            return SyncOutcome::Offline;
        }

        let state = SyncState::capture(&self.identity, &self.avatar, self.config.sync.morph_epsilon);
        match self.router.sync_state(&state).await {
            Ok(report) => {
                if !report.is_empty() {
                    self.stats.syncs_sent += 1;
                }
                SyncOutcome::Sent(report)
            }
            Err(err) => {
                tracing::warn!(error = %err, "sync tick failed");
                SyncOutcome::Failed
            }
        }
    }

    /// Tick at the configured interval until `shutdown` resolves
    pub async fn run_until(&mut self, shutdown: impl Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut last = Instant::now();
        tracing::info!(identity = %self.identity, interval = ?self.config.tick_interval(), "session running");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                now = interval.tick() => {
                    let dt = now.saturating_duration_since(last);
                    last = now;
                    self.tick(dt).await;
                }
            }
        }
        self.shutdown();
    }

    /// Stop the detectors, release everything held for peers and stop
    /// answering RPCs
    pub fn shutdown(&mut self) {
        for detector in [self.face.take(), self.pose.take()].into_iter().flatten() {
            detector.dispose();
        }
        self.router.dispose();
        self.router.unregister_handlers();
        tracing::info!(identity = %self.identity, ticks = self.stats.ticks, "session stopped");
    }
}
