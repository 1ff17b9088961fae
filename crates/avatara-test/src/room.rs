//! In-memory room network
//!
//! Every participant gets a `SimRoom` joined to one shared `RoomNetwork`.
//! An outbound RPC is dispatched synchronously into the destination's
//! registry, so a broadcast has been handled by every peer once its future
//! resolves.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use avatara_core::{AvataraError, AvataraResult, ParticipantIdentity};
use avatara_sync::{ConnectionState, Room, RpcInvocation, RpcRegistry, RpcStatus};

/// One RPC attempt seen by the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcRecord {
    pub from: ParticipantIdentity,
    pub to: ParticipantIdentity,
    pub method: String,
    pub payload: String,
    /// `None` when delivery failed
    pub status: Option<RpcStatus>,
}

/// Shared medium connecting simulated rooms
#[derive(Default)]
pub struct RoomNetwork {
    rooms: Mutex<BTreeMap<ParticipantIdentity, Weak<SimRoom>>>,
    unreachable: Mutex<HashSet<ParticipantIdentity>>,
    log: Mutex<Vec<RpcRecord>>,
}

impl RoomNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a participant. Rejoining with a live identity replaces it.
    pub fn join(self: &Arc<Self>, identity: &str) -> Arc<SimRoom> {
        let room = Arc::new(SimRoom {
            identity: ParticipantIdentity::new(identity),
            network: Arc::clone(self),
            registry: RpcRegistry::new(),
            state: Mutex::new(ConnectionState::Connected),
        });
        self.rooms
            .lock()
            .insert(room.identity.clone(), Arc::downgrade(&room));
        tracing::debug!(%identity, "participant joined simulated room");
        room
    }

    pub fn leave(&self, identity: &ParticipantIdentity) -> bool {
        self.rooms.lock().remove(identity).is_some()
    }

    /// Drop every RPC addressed to `identity` until cleared
    pub fn set_unreachable(&self, identity: &ParticipantIdentity, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(identity.clone());
        } else {
            set.remove(identity);
        }
    }

    pub fn participants(&self) -> Vec<ParticipantIdentity> {
        self.rooms
            .lock()
            .iter()
            .filter(|(_, room)| room.strong_count() > 0)
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<RpcRecord> {
        self.log.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.log.lock().iter().filter(|r| r.method == method).count()
    }

    pub fn clear_calls(&self) {
        self.log.lock().clear();
    }

    fn lookup(&self, identity: &ParticipantIdentity) -> Option<Arc<SimRoom>> {
        self.rooms.lock().get(identity).and_then(Weak::upgrade)
    }

    fn deliver(
        &self,
        from: &ParticipantIdentity,
        to: &ParticipantIdentity,
        method: &str,
        payload: String,
    ) -> AvataraResult<String> {
        let failed = |reason: String| AvataraError::RpcFailed {
            destination: to.clone(),
            reason,
        };

        let outcome = if self.unreachable.lock().contains(to) {
            Err(failed("unreachable".into()))
        } else {
            match self.lookup(to) {
                Some(room) if room.connection_state().is_connected() => room
                    .registry
                    .invoke(&RpcInvocation::new(from.clone(), method, payload.clone()))
                    .map_err(|e| failed(e.to_string())),
                Some(_) => Err(failed("peer offline".into())),
                None => Err(failed("not in room".into())),
            }
        };

        self.log.lock().push(RpcRecord {
            from: from.clone(),
            to: to.clone(),
            method: method.to_string(),
            payload,
            status: outcome.as_ref().ok().copied(),
        });
        outcome.map(|status| status.as_str().to_string())
    }
}

/// One participant's view of the network
pub struct SimRoom {
    identity: ParticipantIdentity,
    network: Arc<RoomNetwork>,
    registry: RpcRegistry,
    state: Mutex<ConnectionState>,
}

impl SimRoom {
    pub fn network(&self) -> &Arc<RoomNetwork> {
        &self.network
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }
}

impl Room for SimRoom {
    fn local_identity(&self) -> ParticipantIdentity {
        self.identity.clone()
    }

    fn remote_participants(&self) -> Vec<ParticipantIdentity> {
        self.network
            .participants()
            .into_iter()
            .filter(|p| *p != self.identity)
            .collect()
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn rpc(&self) -> &RpcRegistry {
        &self.registry
    }

    fn perform_rpc(
        &self,
        destination: &ParticipantIdentity,
        method: &str,
        payload: String,
    ) -> impl Future<Output = AvataraResult<String>> + Send {
        let result = self
            .network
            .deliver(&self.identity, destination, method, payload);
        async move { result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rpc_reaches_destination_registry() {
        let network = RoomNetwork::new();
        let alice = network.join("alice");
        let bob = network.join("bob");
        bob.rpc().upsert("ping", |inv| {
            if inv.payload == "{}" {
                RpcStatus::Ok
            } else {
                RpcStatus::Error
            }
        });

        let response = alice
            .perform_rpc(&bob.local_identity(), "ping", "{}".into())
            .await
            .unwrap();

        assert_eq!(response, "ok");
        assert_eq!(alice.remote_participants(), vec![ParticipantIdentity::new("bob")]);
        assert_eq!(network.calls()[0].status, Some(RpcStatus::Ok));
    }

    #[tokio::test]
    async fn test_unregistered_method_is_delivery_failure() {
        let network = RoomNetwork::new();
        let alice = network.join("alice");
        let bob = network.join("bob");

        let err = alice
            .perform_rpc(&bob.local_identity(), "nothing", "{}".into())
            .await
            .unwrap_err();
        assert!(matches!(err, AvataraError::RpcFailed { .. }));
    }

    #[test]
    fn test_dropped_room_leaves_network() {
        let network = RoomNetwork::new();
        let alice = network.join("alice");
        drop(network.join("bob"));

        assert!(alice.remote_participants().is_empty());
    }
}
