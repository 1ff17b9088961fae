//! Room-scoped RPC registry
//!
//! Handlers are keyed by method name. `upsert` registers or replaces, so a
//! component that is torn down and rebuilt can register again without
//! unregistering first. Handlers answer with a status, never an error.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use avatara_core::{AvataraError, AvataraResult, ParticipantIdentity};

/// RPC method names
pub mod methods {
    pub const REQUEST_JOIN_SPACE: &str = "participantRequestJoinSpace";
    pub const CONFIRM_JOIN_SPACE: &str = "participantConfirmJoinSpace";
    pub const REQUEST_BUILD_SPACE: &str = "participantRequestBuildSpace";
    pub const CONFIRM_BUILD_SPACE: &str = "participantConfirmBuildSpace";
    pub const PLACING_OBJECT: &str = "participantPlacingObject";
    pub const PLACE_OBJECT: &str = "participantPlaceObject";
    pub const SYNC_STATE: &str = "participantSyncState";
    pub const STUDIO_OPERATION: &str = "participantStudioOperation";

    pub const ALL: [&str; 8] = [
        REQUEST_JOIN_SPACE,
        CONFIRM_JOIN_SPACE,
        REQUEST_BUILD_SPACE,
        CONFIRM_BUILD_SPACE,
        PLACING_OBJECT,
        PLACE_OBJECT,
        SYNC_STATE,
        STUDIO_OPERATION,
    ];
}

/// Advisory handler status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcStatus {
    Ok,
    Error,
}

impl RpcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcStatus::Ok => "ok",
            RpcStatus::Error => "error",
        }
    }

    /// Parse a plain or JSON-quoted response string
    pub fn from_response(response: &str) -> RpcStatus {
        match response.trim().trim_matches('"') {
            "ok" => RpcStatus::Ok,
            _ => RpcStatus::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RpcStatus::Ok)
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<E> From<Result<(), E>> for RpcStatus {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => RpcStatus::Ok,
            Err(_) => RpcStatus::Error,
        }
    }
}

/// One inbound call
#[derive(Debug, Clone, PartialEq)]
pub struct RpcInvocation {
    pub caller: ParticipantIdentity,
    pub method: String,
    pub payload: String,
}

impl RpcInvocation {
    pub fn new(
        caller: impl Into<ParticipantIdentity>,
        method: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            caller: caller.into(),
            method: method.into(),
            payload: payload.into(),
        }
    }

    /// Parse the JSON payload
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> AvataraResult<T> {
        serde_json::from_str(&self.payload)
            .map_err(|e| AvataraError::InvalidPayload(format!("{}: {}", self.method, e)))
    }
}

pub type RpcHandler = Arc<dyn Fn(&RpcInvocation) -> RpcStatus + Send + Sync>;

/// Method name → handler
#[derive(Default)]
pub struct RpcRegistry {
    handlers: RwLock<HashMap<String, RpcHandler>>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace. Returns `true` when a handler was replaced.
    pub fn upsert<F>(&self, method: &str, handler: F) -> bool
    where
        F: Fn(&RpcInvocation) -> RpcStatus + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .insert(method.to_string(), Arc::new(handler))
            .is_some()
    }

    pub fn unregister(&self, method: &str) -> bool {
        self.handlers.write().remove(method).is_some()
    }

    pub fn is_registered(&self, method: &str) -> bool {
        self.handlers.read().contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch an inbound call. A panicking handler answers `Error`.
    pub fn invoke(&self, invocation: &RpcInvocation) -> AvataraResult<RpcStatus> {
        let handler = self
            .handlers
            .read()
            .get(&invocation.method)
            .cloned()
            .ok_or_else(|| AvataraError::MethodNotRegistered(invocation.method.clone()))?;

        match catch_unwind(AssertUnwindSafe(|| handler(invocation))) {
            Ok(status) => Ok(status),
            Err(_) => {
                tracing::warn!(
                    method = %invocation.method,
                    caller = %invocation.caller,
                    "rpc handler panicked"
                );
                Ok(RpcStatus::Error)
            }
        }
    }
}

impl fmt::Debug for RpcRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_upsert_replaces_instead_of_stacking() {
        let registry = RpcRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        assert!(!registry.upsert(methods::SYNC_STATE, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            RpcStatus::Ok
        }));
        let counter = second.clone();
        assert!(registry.upsert(methods::SYNC_STATE, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            RpcStatus::Ok
        }));

        let call = RpcInvocation::new("bob", methods::SYNC_STATE, "{}");
        registry.invoke(&call).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_method() {
        let registry = RpcRegistry::new();
        assert!(!registry.unregister(methods::PLACE_OBJECT));

        let call = RpcInvocation::new("bob", methods::PLACE_OBJECT, "{}");
        assert_eq!(
            registry.invoke(&call),
            Err(AvataraError::MethodNotRegistered(methods::PLACE_OBJECT.into()))
        );
    }

    #[test]
    fn test_panicking_handler_reports_error() {
        let registry = RpcRegistry::new();
        registry.upsert("boom", |_| panic!("handler bug"));

        let status = registry.invoke(&RpcInvocation::new("bob", "boom", "")).unwrap();
        assert_eq!(status, RpcStatus::Error);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(RpcStatus::from_response("ok"), RpcStatus::Ok);
        assert_eq!(RpcStatus::from_response("\"ok\""), RpcStatus::Ok);
        assert_eq!(RpcStatus::from_response("error"), RpcStatus::Error);
        assert_eq!(RpcStatus::from_response(""), RpcStatus::Error);
        assert_eq!(RpcStatus::from(Err::<(), _>("bad")), RpcStatus::Error);
    }
}
