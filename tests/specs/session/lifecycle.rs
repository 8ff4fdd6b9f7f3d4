// SPDX-License-Identifier: MIT

use crate::prelude::*;
use roost_core::SessionState;

#[test]
fn a_fresh_session_reaches_connected() {
    let hub = roost_adapters::MemoryHub::new();
    let (_channel, session) = open(&hub, "fresh");

    settle(&session, SessionState::Connected);
    assert_eq!(session.generation(), 0);
    assert!(!session.closed());
}

#[test]
fn expiry_then_reconnect_begins_a_new_generation() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, session) = open(&hub, "expiring");
    settle(&session, SessionState::Connected);

    hub.expire(&channel);
    settle(&session, SessionState::Expired);
    assert_eq!(session.generation(), 0);

    hub.reconnect(&channel);
    settle(&session, SessionState::Connected);
    assert_eq!(session.generation(), 1);
}

#[test]
fn a_transient_disconnect_keeps_the_generation() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, session) = open(&hub, "flaky");
    settle(&session, SessionState::Connected);

    hub.disconnect(&channel);
    settle(&session, SessionState::Disconnected);

    hub.reconnect(&channel);
    settle(&session, SessionState::Connected);
    assert_eq!(session.generation(), 0);
}

#[test]
fn repeated_expiry_cycles_keep_counting() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, session) = open(&hub, "cycling");

    for round in 1..=3u64 {
        settle(&session, SessionState::Connected);
        hub.expire(&channel);
        settle(&session, SessionState::Expired);
        hub.reconnect(&channel);
        settle(&session, SessionState::Connected);
        assert_eq!(session.generation(), round);
    }
}

#[test]
fn close_is_terminal_and_idempotent() {
    let hub = roost_adapters::MemoryHub::new();
    let (_channel, session) = open(&hub, "closing");
    settle(&session, SessionState::Connected);

    session.close();
    assert!(session.closed());
    assert_eq!(session.state(), SessionState::Closed);

    // A second close and further hub traffic are both inert.
    session.close();
    assert!(!session.deliver(roost_core::SessionEvent::State(SessionState::Connected)));
}
