//! Every wire record decoder must reject garbage without panicking

#![no_main]

use libfuzzer_sys::fuzz_target;

use avatara_sync::{JoinSpaceConfirm, JoinSpaceRequest, PlaceObjectRequest, StudioSavedState, SyncState};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(state) = SyncState::decode(text) {
        // Accepted records are finite and re-encodable
        assert!(state.validate().is_ok());
        let encoded = state.encode().expect("decoded state re-encodes");
        assert!(SyncState::decode(&encoded).is_ok());
    }

    let _ = serde_json::from_str::<StudioSavedState>(text);
    let _ = serde_json::from_str::<PlaceObjectRequest>(text);
    let _ = serde_json::from_str::<JoinSpaceRequest>(text);
    let _ = serde_json::from_str::<JoinSpaceConfirm>(text);
});
