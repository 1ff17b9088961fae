//! Multiplayer router
//!
//! Binds the room's RPC surface to local state. Outbound intents are
//! published on the event bus and broadcast to every remote participant;
//! inbound calls resolve the caller's local representation and mutate it.
//!
//! Join and build handshakes are two-phase (request, then confirm) and are
//! evaluated per peer without a quorum: each confirm addressed to us simply
//! sets the flag, so the last one received wins.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use avatara_core::{AvataraError, AvataraResult, MeshId, ParticipantIdentity};
use avatara_visual::{AnimationLibrary, Avatar, AvatarConfig};

use crate::{
    broadcast, methods, AssetCatalog, BroadcastReport, BusEvent, ConnectionState, EventBus,
    HandlerId, LockedObjects, PlaceObjectRequest, PlacementRegistry, RemoteAvatar, Room,
    RpcInvocation, RpcStatus, Scene, StudioHistory, StudioOperationKind, StudioSavedState,
    SyncState,
};

/// Whose space a join or build request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpaceType {
    #[serde(rename = "self")]
    Own,
    #[serde(rename = "other")]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpaceRequest {
    pub identity: ParticipantIdentity,
    pub space_type: SpaceType,
}

/// Answer to a request; `identity` is the requester being answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpaceConfirm {
    pub identity: ParticipantIdentity,
    pub confirm: bool,
}

/// The two handshakes sharing the request/confirm protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    Join,
    Build,
}

impl SpaceKind {
    fn request_method(&self) -> &'static str {
        match self {
            SpaceKind::Join => methods::REQUEST_JOIN_SPACE,
            SpaceKind::Build => methods::REQUEST_BUILD_SPACE,
        }
    }

    fn confirm_method(&self) -> &'static str {
        match self {
            SpaceKind::Join => methods::CONFIRM_JOIN_SPACE,
            SpaceKind::Build => methods::CONFIRM_BUILD_SPACE,
        }
    }

    fn request_event(&self, from: ParticipantIdentity, request: JoinSpaceRequest) -> BusEvent {
        match self {
            SpaceKind::Join => BusEvent::RequestJoinSpace { from, request },
            SpaceKind::Build => BusEvent::RequestBuildSpace { from, request },
        }
    }

    fn confirm_event(&self, from: ParticipantIdentity, confirm: JoinSpaceConfirm) -> BusEvent {
        match self {
            SpaceKind::Join => BusEvent::ConfirmJoinSpace { from, confirm },
            SpaceKind::Build => BusEvent::ConfirmBuildSpace { from, confirm },
        }
    }
}

/// Result of a join or build request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Alone in the room asking for our own space: granted locally
    Granted,
    /// Alone in the room asking for someone else's space: nothing to join
    NoOp,
    /// Sent to every peer; a confirm arrives later
    Requested(BroadcastReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceFlags {
    pub multiplayer: bool,
    pub build_mode: bool,
}

/// How remote avatars are instantiated
#[derive(Debug, Clone, Default)]
pub struct AvatarTemplate {
    pub config: AvatarConfig,
    pub library: AnimationLibrary,
}

impl AvatarTemplate {
    pub fn new(config: AvatarConfig, library: AnimationLibrary) -> Self {
        Self { config, library }
    }

    pub fn instantiate(&self) -> Avatar {
        Avatar::new(self.config.clone(), self.library.clone())
    }
}

#[derive(Debug, Default)]
struct RouterState {
    flags: SpaceFlags,
    pending_join: BTreeSet<ParticipantIdentity>,
    pending_build: BTreeSet<ParticipantIdentity>,
    placements: PlacementRegistry,
    remote_avatars: BTreeMap<ParticipantIdentity, RemoteAvatar>,
    locked: LockedObjects,
    history: StudioHistory,
}

impl RouterState {
    fn pending_mut(&mut self, kind: SpaceKind) -> &mut BTreeSet<ParticipantIdentity> {
        match kind {
            SpaceKind::Join => &mut self.pending_join,
            SpaceKind::Build => &mut self.pending_build,
        }
    }

    fn set_flag(&mut self, kind: SpaceKind, value: bool) {
        match kind {
            SpaceKind::Join => self.flags.multiplayer = value,
            SpaceKind::Build => self.flags.build_mode = value,
        }
    }

    fn apply_locks(&mut self, operation: &StudioSavedState) {
        match operation.operation {
            StudioOperationKind::Lock => {
                for mesh in &operation.payload.meshes {
                    self.locked.lock(*mesh);
                }
            }
            StudioOperationKind::Unlock => {
                for mesh in &operation.payload.meshes {
                    self.locked.unlock(*mesh);
                }
            }
            _ => {}
        }
    }
}

struct Shared {
    local: ParticipantIdentity,
    scene: Arc<dyn Scene>,
    catalog: Arc<AssetCatalog>,
    bus: EventBus,
    template: AvatarTemplate,
    state: Mutex<RouterState>,
}

type InboundHandler = fn(&Shared, &RpcInvocation) -> AvataraResult<()>;

/// Routes local intents out and remote RPCs in
pub struct MultiplayerRouter<R: Room> {
    room: Arc<R>,
    shared: Arc<Shared>,
}

impl<R: Room> MultiplayerRouter<R> {
    pub fn new(
        room: Arc<R>,
        scene: Arc<dyn Scene>,
        catalog: Arc<AssetCatalog>,
        bus: EventBus,
        template: AvatarTemplate,
    ) -> Self {
        let shared = Arc::new(Shared {
            local: room.local_identity(),
            scene,
            catalog,
            bus,
            template,
            state: Mutex::new(RouterState::default()),
        });
        Self { room, shared }
    }

    pub fn room(&self) -> &Arc<R> {
        &self.room
    }

    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn local_identity(&self) -> &ParticipantIdentity {
        &self.shared.local
    }

    /// Upsert every inbound handler. Safe to call again after a remount.
    pub fn register_handlers(&self) {
        self.bind(methods::REQUEST_JOIN_SPACE, |s, i| on_request_space(s, SpaceKind::Join, i));
        self.bind(methods::CONFIRM_JOIN_SPACE, |s, i| on_confirm_space(s, SpaceKind::Join, i));
        self.bind(methods::REQUEST_BUILD_SPACE, |s, i| on_request_space(s, SpaceKind::Build, i));
        self.bind(methods::CONFIRM_BUILD_SPACE, |s, i| on_confirm_space(s, SpaceKind::Build, i));
        self.bind(methods::PLACING_OBJECT, on_placing_object);
        self.bind(methods::PLACE_OBJECT, on_place_object);
        self.bind(methods::SYNC_STATE, on_sync_state);
        self.bind(methods::STUDIO_OPERATION, on_studio_operation);
        tracing::debug!(local = %self.shared.local, "rpc handlers registered");
    }

    pub fn unregister_handlers(&self) {
        for method in methods::ALL {
            self.room.rpc().unregister(method);
        }
    }

    fn bind(&self, method: &'static str, handler: InboundHandler) {
        let shared = Arc::clone(&self.shared);
        self.room.rpc().upsert(method, move |invocation| {
            match handler(&shared, invocation) {
                Ok(()) => RpcStatus::Ok,
                Err(err) => {
                    tracing::warn!(method, caller = %invocation.caller, error = %err, "inbound rpc rejected");
                    RpcStatus::Error
                }
            }
        });
    }

    pub fn on_connection_state(&self, state: ConnectionState) {
        tracing::info!(?state, "room connection state changed");
        if state.is_connected() {
            self.register_handlers();
        }
    }

    pub async fn request_join_space(&self, space_type: SpaceType) -> AvataraResult<JoinOutcome> {
        self.request_space(SpaceKind::Join, space_type).await
    }

    pub async fn request_build_space(&self, space_type: SpaceType) -> AvataraResult<JoinOutcome> {
        self.request_space(SpaceKind::Build, space_type).await
    }

    async fn request_space(&self, kind: SpaceKind, space_type: SpaceType) -> AvataraResult<JoinOutcome> {
        if self.room.remote_participants().is_empty() {
            return Ok(match space_type {
                SpaceType::Own => {
                    self.shared.state.lock().set_flag(kind, true);
                    tracing::info!(?kind, "alone in room, space granted locally");
                    JoinOutcome::Granted
                }
                SpaceType::Other => JoinOutcome::NoOp,
            });
        }

        let request = JoinSpaceRequest {
            identity: self.shared.local.clone(),
            space_type,
        };
        let payload = to_payload(&request)?;
        self.shared
            .bus
            .publish(kind.request_event(self.shared.local.clone(), request));
        let report = broadcast(&*self.room, kind.request_method(), &payload).await;
        Ok(JoinOutcome::Requested(report))
    }

    pub async fn confirm_join_space(
        &self,
        requester: &ParticipantIdentity,
        confirm: bool,
    ) -> AvataraResult<BroadcastReport> {
        self.confirm_space(SpaceKind::Join, requester, confirm).await
    }

    pub async fn confirm_build_space(
        &self,
        requester: &ParticipantIdentity,
        confirm: bool,
    ) -> AvataraResult<BroadcastReport> {
        self.confirm_space(SpaceKind::Build, requester, confirm).await
    }

    /// Answer a pending request. Confirming also opens the space on our side.
    async fn confirm_space(
        &self,
        kind: SpaceKind,
        requester: &ParticipantIdentity,
        confirm: bool,
    ) -> AvataraResult<BroadcastReport> {
        {
            let mut state = self.shared.state.lock();
            if !state.pending_mut(kind).remove(requester) {
                tracing::debug!(%requester, ?kind, "answering a request that is not pending");
            }
            if confirm {
                state.set_flag(kind, true);
            }
        }

        let answer = JoinSpaceConfirm {
            identity: requester.clone(),
            confirm,
        };
        let payload = to_payload(&answer)?;
        self.shared
            .bus
            .publish(kind.confirm_event(self.shared.local.clone(), answer));
        Ok(broadcast(&*self.room, kind.confirm_method(), &payload).await)
    }

    /// Broadcast a ghost preview of a local placement
    pub async fn placing_object(&self, request: PlaceObjectRequest) -> AvataraResult<BroadcastReport> {
        self.shared.catalog.require(&request.asset)?;
        let payload = to_payload(&request)?;
        self.shared.bus.publish(BusEvent::PlacingObject {
            from: self.shared.local.clone(),
            request,
        });
        Ok(broadcast(&*self.room, methods::PLACING_OBJECT, &payload).await)
    }

    /// Broadcast a committed local placement
    pub async fn place_object(&self, request: PlaceObjectRequest) -> AvataraResult<BroadcastReport> {
        self.shared.catalog.require(&request.asset)?;
        let payload = to_payload(&request)?;
        self.shared.bus.publish(BusEvent::PlaceObject {
            from: self.shared.local.clone(),
            request,
            mesh: None,
        });
        Ok(broadcast(&*self.room, methods::PLACE_OBJECT, &payload).await)
    }

    /// Send our avatar snapshot. Nothing is sent without peers.
    pub async fn sync_state(&self, state: &SyncState) -> AvataraResult<BroadcastReport> {
        if self.room.remote_participants().is_empty() {
            return Ok(BroadcastReport::default());
        }
        if state.session_id != self.shared.local {
            return Err(AvataraError::IdentityMismatch {
                caller: self.shared.local.clone(),
                record: state.session_id.clone(),
            });
        }
        let payload = state.encode()?;
        Ok(broadcast(&*self.room, methods::SYNC_STATE, &payload).await)
    }

    /// Record a local studio operation and replicate it
    pub async fn record_operation(&self, operation: StudioSavedState) -> AvataraResult<BroadcastReport> {
        let payload = to_payload(&operation)?;
        {
            let mut state = self.shared.state.lock();
            state.apply_locks(&operation);
            state.history.append(&self.shared.local, operation.clone());
        }
        self.shared.bus.publish(BusEvent::StudioOperation {
            from: self.shared.local.clone(),
            state: operation,
        });
        Ok(broadcast(&*self.room, methods::STUDIO_OPERATION, &payload).await)
    }

    /// Undo our latest operation; `None` when there is nothing left to undo
    pub async fn undo(&self) -> AvataraResult<Option<StudioSavedState>> {
        let inverse = {
            let mut state = self.shared.state.lock();
            let inverse = state.history.undo(&self.shared.local);
            if let Some(inverse) = &inverse {
                state.apply_locks(inverse);
            }
            inverse
        };
        let Some(inverse) = inverse else {
            return Ok(None);
        };

        let payload = to_payload(&inverse)?;
        self.shared.bus.publish(BusEvent::StudioOperation {
            from: self.shared.local.clone(),
            state: inverse.clone(),
        });
        broadcast(&*self.room, methods::STUDIO_OPERATION, &payload).await;
        Ok(Some(inverse))
    }

    /// Drop everything held for a participant who left the room
    pub fn participant_left(&self, identity: &ParticipantIdentity) {
        let (avatar, handler) = {
            let mut state = self.shared.state.lock();
            state.pending_join.remove(identity);
            state.pending_build.remove(identity);
            (
                state.remote_avatars.remove(identity).is_some(),
                state.placements.dispose(&*self.shared.scene, identity),
            )
        };
        tracing::info!(%identity, avatar, handler, "participant left");
        self.shared.bus.publish(BusEvent::ParticipantLeft {
            identity: identity.clone(),
        });
    }

    /// Release every ghost held for remote participants. Handlers stay
    /// registered; a replacement router upserts over them.
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        state.placements.dispose_all(&*self.shared.scene);
        state.remote_avatars.clear();
    }

    /// Advance every remote avatar's animation clock
    pub fn advance_remote(&self, dt: Duration) {
        for remote in self.shared.state.lock().remote_avatars.values_mut() {
            remote.advance(dt);
        }
    }

    pub fn flags(&self) -> SpaceFlags {
        self.shared.state.lock().flags
    }

    pub fn is_multiplayer(&self) -> bool {
        self.flags().multiplayer
    }

    pub fn is_build_mode(&self) -> bool {
        self.flags().build_mode
    }

    pub fn pending_requests(&self, kind: SpaceKind) -> Vec<ParticipantIdentity> {
        self.shared.state.lock().pending_mut(kind).iter().cloned().collect()
    }

    pub fn placement_handler(&self, owner: &ParticipantIdentity) -> Option<HandlerId> {
        self.shared.state.lock().placements.handler(owner).map(|h| h.id())
    }

    pub fn placed_objects(&self, owner: &ParticipantIdentity) -> Vec<MeshId> {
        self.shared
            .state
            .lock()
            .placements
            .handler(owner)
            .map(|h| h.placed().to_vec())
            .unwrap_or_default()
    }

    /// Inspect a remote avatar without holding on to the lock
    pub fn with_remote_avatar<T>(
        &self,
        identity: &ParticipantIdentity,
        f: impl FnOnce(&RemoteAvatar) -> T,
    ) -> Option<T> {
        self.shared.state.lock().remote_avatars.get(identity).map(f)
    }

    pub fn remote_avatar_count(&self) -> usize {
        self.shared.state.lock().remote_avatars.len()
    }

    pub fn locked_objects(&self) -> LockedObjects {
        self.shared.state.lock().locked.clone()
    }

    pub fn history(&self, owner: &ParticipantIdentity) -> Vec<StudioSavedState> {
        self.shared.state.lock().history.history(owner).to_vec()
    }
}

fn to_payload<T: Serialize>(value: &T) -> AvataraResult<String> {
    serde_json::to_string(value).map_err(|e| AvataraError::InvalidPayload(e.to_string()))
}

fn on_request_space(shared: &Shared, kind: SpaceKind, invocation: &RpcInvocation) -> AvataraResult<()> {
    let request: JoinSpaceRequest = invocation.parse()?;
    if request.identity != invocation.caller {
        return Err(AvataraError::IdentityMismatch {
            caller: invocation.caller.clone(),
            record: request.identity,
        });
    }
    shared.state.lock().pending_mut(kind).insert(invocation.caller.clone());
    shared.bus.publish(kind.request_event(invocation.caller.clone(), request));
    Ok(())
}

fn on_confirm_space(shared: &Shared, kind: SpaceKind, invocation: &RpcInvocation) -> AvataraResult<()> {
    let answer: JoinSpaceConfirm = invocation.parse()?;
    if answer.identity == shared.local {
        shared.state.lock().set_flag(kind, answer.confirm);
        tracing::info!(?kind, host = %invocation.caller, granted = answer.confirm, "space request answered");
    }
    shared.bus.publish(kind.confirm_event(invocation.caller.clone(), answer));
    Ok(())
}

fn on_placing_object(shared: &Shared, invocation: &RpcInvocation) -> AvataraResult<()> {
    let request: PlaceObjectRequest = invocation.parse()?;
    let record = shared.catalog.require(&request.asset)?;
    shared
        .state
        .lock()
        .placements
        .placing(&*shared.scene, &invocation.caller, record, &request)?;
    shared.bus.publish(BusEvent::PlacingObject {
        from: invocation.caller.clone(),
        request,
    });
    Ok(())
}

fn on_place_object(shared: &Shared, invocation: &RpcInvocation) -> AvataraResult<()> {
    let request: PlaceObjectRequest = invocation.parse()?;
    let record = shared.catalog.require(&request.asset)?;
    let mesh = shared
        .state
        .lock()
        .placements
        .place(&*shared.scene, &invocation.caller, record, &request)?;
    shared.bus.publish(BusEvent::PlaceObject {
        from: invocation.caller.clone(),
        request,
        mesh: Some(mesh),
    });
    Ok(())
}

fn on_sync_state(shared: &Shared, invocation: &RpcInvocation) -> AvataraResult<()> {
    let state = SyncState::decode(&invocation.payload)?;
    if state.session_id != invocation.caller {
        return Err(AvataraError::IdentityMismatch {
            caller: invocation.caller.clone(),
            record: state.session_id,
        });
    }

    let mut guard = shared.state.lock();
    let remote = guard
        .remote_avatars
        .entry(invocation.caller.clone())
        .or_insert_with(|| {
            tracing::debug!(caller = %invocation.caller, "remote avatar created");
            RemoteAvatar::new(invocation.caller.clone(), shared.template.instantiate())
        });
    remote.apply(state)
}

fn on_studio_operation(shared: &Shared, invocation: &RpcInvocation) -> AvataraResult<()> {
    let operation: StudioSavedState = invocation.parse()?;
    {
        let mut state = shared.state.lock();
        state.apply_locks(&operation);
        state.history.append(&invocation.caller, operation.clone());
    }
    shared.bus.publish(BusEvent::StudioOperation {
        from: invocation.caller.clone(),
        state: operation,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::testing::RecordingRoom;
    use crate::scene::testing::MockScene;
    use crate::{AssetKind, AssetRecord, PlacementOrigin, StudioPayload, Topic};
    use avatara_core::{Transform, Vec3};

    struct Fixture {
        room: Arc<RecordingRoom>,
        scene: Arc<MockScene>,
        router: MultiplayerRouter<RecordingRoom>,
    }

    fn fixture(peers: &[&str]) -> Fixture {
        let room = Arc::new(RecordingRoom::new("alice", peers));
        let scene = Arc::new(MockScene::default());
        let catalog: AssetCatalog = [
            AssetRecord::new("sofa", AssetKind::Furniture, "/assets/sofa.glb"),
            AssetRecord::new("crate", AssetKind::Furniture, ""),
        ]
        .into_iter()
        .collect();
        let router = MultiplayerRouter::new(
            Arc::clone(&room),
            scene.clone(),
            Arc::new(catalog),
            EventBus::new(),
            AvatarTemplate::default(),
        );
        router.register_handlers();
        Fixture { room, scene, router }
    }

    fn inbound(f: &Fixture, caller: &str, method: &str, payload: &str) -> RpcStatus {
        f.room
            .rpc()
            .invoke(&RpcInvocation::new(caller, method, payload))
            .unwrap()
    }

    fn asset_at(asset: &str, x: f32) -> String {
        serde_json::to_string(&PlaceObjectRequest::new(
            PlacementOrigin::Remote,
            asset,
            Transform::from_position(Vec3::new(x, 0.0, 0.0)),
        ))
        .unwrap()
    }

    fn sofa_at(x: f32) -> String {
        asset_at("sofa", x)
    }

    #[tokio::test]
    async fn test_alone_requesting_own_space_is_granted() {
        let f = fixture(&[]);
        let outcome = f.router.request_join_space(SpaceType::Own).await.unwrap();

        assert_eq!(outcome, JoinOutcome::Granted);
        assert!(f.router.is_multiplayer());
        assert!(f.room.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_alone_requesting_other_space_is_noop() {
        let f = fixture(&[]);
        let outcome = f.router.request_join_space(SpaceType::Other).await.unwrap();

        assert_eq!(outcome, JoinOutcome::NoOp);
        assert_eq!(f.router.flags(), SpaceFlags::default());
        assert!(f.room.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_request_reaches_every_peer() {
        let f = fixture(&["bob", "carol"]);
        let mut events = f.router.bus().subscribe(Topic::RequestJoinSpace);

        let outcome = f.router.request_join_space(SpaceType::Other).await.unwrap();

        let JoinOutcome::Requested(report) = outcome else {
            panic!("expected a broadcast");
        };
        assert_eq!(report.acknowledged(), 2);
        assert_eq!(f.room.calls_to(methods::REQUEST_JOIN_SPACE), 2);
        assert!(!f.router.is_multiplayer());
        assert!(events.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_confirm_addressed_to_us_sets_flag_last_wins() {
        let f = fixture(&["bob", "carol"]);
        let yes = r#"{"identity":"alice","confirm":true}"#;
        let no = r#"{"identity":"alice","confirm":false}"#;

        assert_eq!(inbound(&f, "bob", methods::CONFIRM_JOIN_SPACE, yes), RpcStatus::Ok);
        assert!(f.router.is_multiplayer());
        assert_eq!(inbound(&f, "carol", methods::CONFIRM_JOIN_SPACE, no), RpcStatus::Ok);
        assert!(!f.router.is_multiplayer());

        let other = r#"{"identity":"dave","confirm":true}"#;
        inbound(&f, "bob", methods::CONFIRM_JOIN_SPACE, other);
        assert!(!f.router.is_multiplayer());
    }

    #[tokio::test]
    async fn test_build_handshake_uses_separate_flag() {
        let f = fixture(&["bob"]);
        let request = r#"{"identity":"bob","spaceType":"self"}"#;
        assert_eq!(inbound(&f, "bob", methods::REQUEST_BUILD_SPACE, request), RpcStatus::Ok);
        assert_eq!(f.router.pending_requests(SpaceKind::Build), vec![ParticipantIdentity::new("bob")]);

        f.router
            .confirm_build_space(&ParticipantIdentity::new("bob"), true)
            .await
            .unwrap();

        assert!(f.router.is_build_mode());
        assert!(!f.router.is_multiplayer());
        assert!(f.router.pending_requests(SpaceKind::Build).is_empty());
        assert_eq!(f.room.calls_to(methods::CONFIRM_BUILD_SPACE), 1);
    }

    #[test]
    fn test_request_for_someone_else_is_rejected() {
        let f = fixture(&["bob"]);
        let forged = r#"{"identity":"carol","spaceType":"other"}"#;

        assert_eq!(inbound(&f, "bob", methods::REQUEST_JOIN_SPACE, forged), RpcStatus::Error);
        assert!(f.router.pending_requests(SpaceKind::Join).is_empty());
    }

    #[test]
    fn test_place_without_placing_answers_error() {
        let f = fixture(&["X"]);

        assert_eq!(inbound(&f, "X", methods::PLACE_OBJECT, &sofa_at(1.0)), RpcStatus::Error);
        assert!(f.router.placement_handler(&ParticipantIdentity::new("X")).is_none());
        assert!(f.scene.alive.lock().is_empty());
    }

    #[test]
    fn test_placing_twice_reuses_handler_then_commits() {
        let f = fixture(&["bob"]);
        let bob = ParticipantIdentity::new("bob");

        assert_eq!(inbound(&f, "bob", methods::PLACING_OBJECT, &sofa_at(1.0)), RpcStatus::Ok);
        let first = f.router.placement_handler(&bob);
        assert_eq!(inbound(&f, "bob", methods::PLACING_OBJECT, &sofa_at(2.0)), RpcStatus::Ok);
        assert_eq!(f.router.placement_handler(&bob), first);

        assert_eq!(inbound(&f, "bob", methods::PLACE_OBJECT, &sofa_at(3.0)), RpcStatus::Ok);
        assert_eq!(f.router.placed_objects(&bob).len(), 1);
    }

    #[test]
    fn test_failed_ghost_keeps_place_rejected() {
        let f = fixture(&["bob"]);
        let bob = ParticipantIdentity::new("bob");

        assert_eq!(inbound(&f, "bob", methods::PLACING_OBJECT, &asset_at("crate", 1.0)), RpcStatus::Error);
        assert!(f.router.placement_handler(&bob).is_none());

        assert_eq!(inbound(&f, "bob", methods::PLACE_OBJECT, &asset_at("crate", 1.0)), RpcStatus::Error);
        assert!(f.router.placed_objects(&bob).is_empty());
        assert!(f.scene.alive.lock().is_empty());
    }

    #[test]
    fn test_unknown_asset_answers_error() {
        let f = fixture(&["bob"]);
        let payload = r#"{"origin":"other","asset":"piano"}"#;

        assert_eq!(inbound(&f, "bob", methods::PLACING_OBJECT, payload), RpcStatus::Error);
        assert!(f.router.placement_handler(&ParticipantIdentity::new("bob")).is_none());
    }

    #[test]
    fn test_sync_state_creates_remote_avatar() {
        let f = fixture(&["bob"]);
        let payload = r#"{"sessionId":"bob","position":[1,0,2],"rotation":[0,0,0,1],"isMoving":true}"#;

        assert_eq!(inbound(&f, "bob", methods::SYNC_STATE, payload), RpcStatus::Ok);
        let bob = ParticipantIdentity::new("bob");
        let position = f.router.with_remote_avatar(&bob, |r| r.avatar().position);
        assert_eq!(position, Some(Vec3::new(1.0, 0.0, 2.0)));

        let spoofed = r#"{"sessionId":"carol","position":[0,0,0],"rotation":[0,0,0,1]}"#;
        assert_eq!(inbound(&f, "bob", methods::SYNC_STATE, spoofed), RpcStatus::Error);
        assert_eq!(f.router.remote_avatar_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_skipped_without_peers() {
        let f = fixture(&[]);
        let state = SyncState::capture(
            &ParticipantIdentity::new("alice"),
            &AvatarTemplate::default().instantiate(),
            0.01,
        );

        let report = f.router.sync_state(&state).await.unwrap();
        assert!(report.is_empty());
        assert!(f.room.calls.lock().is_empty());
    }

    #[test]
    fn test_participant_left_releases_state() {
        let f = fixture(&["bob"]);
        let bob = ParticipantIdentity::new("bob");
        let mut left = f.router.bus().subscribe(Topic::ParticipantLeft);
        inbound(&f, "bob", methods::PLACING_OBJECT, &sofa_at(1.0));
        inbound(
            &f,
            "bob",
            methods::SYNC_STATE,
            r#"{"sessionId":"bob","position":[0,0,0],"rotation":[0,0,0,1]}"#,
        );

        f.router.participant_left(&bob);

        assert!(f.router.placement_handler(&bob).is_none());
        assert_eq!(f.router.remote_avatar_count(), 0);
        assert!(f.scene.alive.lock().is_empty());
        assert!(left.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_studio_lock_replicates_and_undoes() {
        let f = fixture(&["bob"]);
        let mesh = MeshId::new(4);
        let lock = StudioSavedState::new(StudioOperationKind::Lock, StudioPayload::meshes([mesh]));

        f.router.record_operation(lock).await.unwrap();
        assert!(f.router.locked_objects().is_locked(mesh));

        let inverse = f.router.undo().await.unwrap().unwrap();
        assert_eq!(inverse.operation, StudioOperationKind::Unlock);
        assert!(!f.router.locked_objects().is_locked(mesh));
        assert_eq!(f.room.calls_to(methods::STUDIO_OPERATION), 2);
        assert_eq!(f.router.history(&ParticipantIdentity::new("alice")).len(), 2);
    }

    #[test]
    fn test_inbound_studio_operation_lands_in_sender_history() {
        let f = fixture(&["bob"]);
        let op = StudioSavedState::new(StudioOperationKind::Lock, StudioPayload::meshes([MeshId::new(8)]));
        let payload = serde_json::to_string(&op).unwrap();

        assert_eq!(inbound(&f, "bob", methods::STUDIO_OPERATION, &payload), RpcStatus::Ok);
        assert_eq!(f.router.history(&ParticipantIdentity::new("bob")), vec![op]);
        assert!(f.router.locked_objects().is_locked(MeshId::new(8)));
    }

    #[test]
    fn test_reconnect_reupserts_without_stacking() {
        let f = fixture(&[]);
        f.router.on_connection_state(ConnectionState::Reconnecting);
        f.router.on_connection_state(ConnectionState::Connected);

        assert_eq!(f.room.rpc().len(), methods::ALL.len());
    }

    #[test]
    fn test_unregister_handlers_clears_registry() {
        let f = fixture(&[]);
        f.router.unregister_handlers();
        assert!(f.room.rpc().is_empty());
    }
}
