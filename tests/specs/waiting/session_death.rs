// SPDX-License-Identifier: MIT

//! Session death must reach every blocked thread as a typed error, never
//! leave it hanging on a watch that can no longer fire.

use crate::prelude::*;
use roost_core::{CreateMode, NodeChannel, SessionState, WaitError};
use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

fn blocked_waiter(
    hub: &roost_adapters::MemoryHub,
) -> (
    roost_adapters::MemoryChannel,
    Arc<roost_core::Session>,
    JoinHandle<Result<(), WaitError>>,
) {
    let (channel, session) = open(hub, "doomed");
    settle(&session, SessionState::Connected);
    channel.create("/held", b"", CreateMode::Persistent).unwrap();

    let blocked = Arc::clone(&session);
    let waiter = thread::spawn(move || blocked.block_until_node_deleted("/held"));
    assert!(eventually(TICK, || session.waiting_on("/held") == 1));
    (channel, session, waiter)
}

#[test]
fn expiry_wakes_the_waiter_with_session_expired() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, session, waiter) = blocked_waiter(&hub);

    hub.expire(&channel);

    let result = waiter.join().unwrap();
    assert_eq!(
        result,
        Err(WaitError::SessionExpired {
            path: "/held".into()
        })
    );
    assert!(result.unwrap_err().is_session_death());
    assert_eq!(session.waiting_on("/held"), 0);
}

#[test]
fn disconnection_wakes_the_waiter_with_not_connected() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, _session, waiter) = blocked_waiter(&hub);

    hub.disconnect(&channel);

    assert_eq!(
        waiter.join().unwrap(),
        Err(WaitError::NotConnected {
            path: "/held".into()
        })
    );
}

#[test]
fn close_wakes_the_waiter_with_connection_closed() {
    let hub = roost_adapters::MemoryHub::new();
    let (_channel, session, waiter) = blocked_waiter(&hub);

    session.close();

    assert_eq!(
        waiter.join().unwrap(),
        Err(WaitError::ConnectionClosed {
            path: "/held".into()
        })
    );
}

#[test]
fn a_wait_started_after_reconnection_is_not_haunted_by_old_deaths() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, session) = open(&hub, "phoenix");
    settle(&session, SessionState::Connected);

    hub.expire(&channel);
    settle(&session, SessionState::Expired);
    hub.reconnect(&channel);
    settle(&session, SessionState::Connected);

    channel.create("/held", b"", CreateMode::Persistent).unwrap();
    let blocked = Arc::clone(&session);
    let waiter = thread::spawn(move || blocked.block_until_node_deleted("/held"));
    assert!(eventually(TICK, || session.waiting_on("/held") == 1));

    channel.delete("/held").unwrap();
    waiter.join().unwrap().unwrap();
}

#[test]
fn a_wait_started_after_close_fails_instead_of_hanging() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, session) = open(&hub, "late");
    settle(&session, SessionState::Connected);
    channel.create("/held", b"", CreateMode::Persistent).unwrap();

    session.close();

    assert_eq!(
        session.block_until_node_deleted("/held"),
        Err(WaitError::ConnectionClosed {
            path: "/held".into()
        })
    );
}

#[test]
fn death_errors_carry_the_watched_path() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, _session, waiter) = blocked_waiter(&hub);

    hub.expire(&channel);
    let err = waiter.join().unwrap().unwrap_err();
    assert!(err.to_string().contains("/held"), "{err}");
}
