//! Room transport capability and per-peer broadcast

use std::future::Future;

use avatara_core::{AvataraResult, ParticipantIdentity};

use crate::{RpcRegistry, RpcStatus};

/// Room connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Conferencing room as seen by the sync layer
pub trait Room: Send + Sync + 'static {
    fn local_identity(&self) -> ParticipantIdentity;

    /// Remote participants currently in the room, excluding the local one
    fn remote_participants(&self) -> Vec<ParticipantIdentity>;

    fn connection_state(&self) -> ConnectionState;

    /// Handlers the transport dispatches inbound RPCs to
    fn rpc(&self) -> &RpcRegistry;

    /// Invoke `method` on one peer; resolves with the peer's response string
    fn perform_rpc(
        &self,
        destination: &ParticipantIdentity,
        method: &str,
        payload: String,
    ) -> impl Future<Output = AvataraResult<String>> + Send;
}

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<(ParticipantIdentity, RpcStatus)>,
    pub failed: Vec<ParticipantIdentity>,
}

impl BroadcastReport {
    /// Nobody was addressed
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn acknowledged(&self) -> usize {
        self.delivered.iter().filter(|(_, s)| s.is_ok()).count()
    }
}

/// Invoke `method` on every remote participant, one after another.
///
/// A failing peer is logged and skipped; it never stops delivery to the
/// rest.
pub async fn broadcast<R: Room>(room: &R, method: &str, payload: &str) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    for peer in room.remote_participants() {
        match room.perform_rpc(&peer, method, payload.to_string()).await {
            Ok(response) => {
                let status = RpcStatus::from_response(&response);
                if !status.is_ok() {
                    tracing::debug!(%peer, method, "peer answered error");
                }
                report.delivered.push((peer, status));
            }
            Err(err) => {
                tracing::warn!(%peer, method, error = %err, "rpc delivery failed");
                report.failed.push(peer);
            }
        }
    }

    report
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;

    use parking_lot::Mutex;

    use avatara_core::AvataraError;

    use super::*;

    /// Room that records outbound calls and answers "ok"
    pub struct RecordingRoom {
        pub local: ParticipantIdentity,
        pub peers: Mutex<Vec<ParticipantIdentity>>,
        pub unreachable: Mutex<HashSet<ParticipantIdentity>>,
        pub calls: Mutex<Vec<(ParticipantIdentity, String, String)>>,
        pub state: Mutex<ConnectionState>,
        registry: RpcRegistry,
    }

    impl RecordingRoom {
        pub fn new(local: &str, peers: &[&str]) -> Self {
            Self {
                local: ParticipantIdentity::new(local),
                peers: Mutex::new(peers.iter().map(|p| ParticipantIdentity::new(*p)).collect()),
                unreachable: Mutex::new(HashSet::new()),
                calls: Mutex::new(Vec::new()),
                state: Mutex::new(ConnectionState::Connected),
                registry: RpcRegistry::new(),
            }
        }

        pub fn calls_to(&self, method: &str) -> usize {
            self.calls.lock().iter().filter(|(_, m, _)| m == method).count()
        }
    }

    impl Room for RecordingRoom {
        fn local_identity(&self) -> ParticipantIdentity {
            self.local.clone()
        }

        fn remote_participants(&self) -> Vec<ParticipantIdentity> {
            self.peers.lock().clone()
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
            self.calls
                .lock()
                .push((destination.clone(), method.to_string(), payload));
            let result = if self.unreachable.lock().contains(destination) {
                Err(AvataraError::RpcFailed {
                    destination: destination.clone(),
                    reason: "peer unreachable".into(),
                })
            } else {
                Ok("ok".to_string())
            };
            async move { result }
        }
    }

    #[tokio::test]
    async fn test_broadcast_isolates_failing_peer() {
        let room = RecordingRoom::new("alice", &["bob", "carol", "dave"]);
        room.unreachable.lock().insert(ParticipantIdentity::new("carol"));

        let report = broadcast(&room, "ping", "{}").await;

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.acknowledged(), 2);
        assert_eq!(report.failed, vec![ParticipantIdentity::new("carol")]);
    }

    #[tokio::test]
    async fn test_broadcast_without_peers_sends_nothing() {
        let room = RecordingRoom::new("alice", &[]);
        let report = broadcast(&room, "ping", "{}").await;

        assert!(report.is_empty());
        assert!(room.calls.lock().is_empty());
    }
}
