//! Arbitrary inbound calls against a live router

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use avatara_core::ParticipantIdentity;
use avatara_sync::{methods, Room, RpcInvocation};
use avatara_test::{Peer, RoomNetwork};

const CALLERS: [&str; 3] = ["alice", "bob", "mallory"];

#[derive(Debug, Arbitrary)]
struct Call {
    caller: u8,
    method: u8,
    payload: String,
}

fuzz_target!(|calls: Vec<Call>| {
    let network = RoomNetwork::new();
    let host = Peer::join(&network, "host");

    for call in calls.iter().take(64) {
        let caller = ParticipantIdentity::new(CALLERS[call.caller as usize % CALLERS.len()]);
        let method = methods::ALL[call.method as usize % methods::ALL.len()];
        let invocation = RpcInvocation::new(caller, method, call.payload.clone());

        // Handlers answer ok or error; they never fail dispatch
        assert!(host.room.rpc().invoke(&invocation).is_ok());
    }

    host.router.participant_left(&ParticipantIdentity::new("mallory"));
    assert!(host.router.placement_handler(&ParticipantIdentity::new("mallory")).is_none());
});
