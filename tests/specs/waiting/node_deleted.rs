// SPDX-License-Identifier: MIT

use crate::prelude::*;
use roost_core::{CreateMode, NodeChannel, SessionConfig, SessionState, WaitError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn an_absent_node_returns_immediately() {
    let hub = roost_adapters::MemoryHub::new();
    let (_channel, session) = open(&hub, "fast-path");
    settle(&session, SessionState::Connected);

    session.block_until_node_deleted("/never-there").unwrap();
    assert_eq!(session.waiting_on("/never-there"), 0);
}

#[test]
fn deletion_by_another_session_releases_the_waiter() {
    let hub = roost_adapters::MemoryHub::new();
    let (owner, _owner_session) = open(&hub, "owner");
    let (_channel, session) = open(&hub, "waiter");
    settle(&session, SessionState::Connected);

    owner.create("/held", b"", CreateMode::Persistent).unwrap();

    let blocked = Arc::clone(&session);
    let waiter = thread::spawn(move || blocked.block_until_node_deleted("/held"));

    assert!(eventually(TICK, || session.waiting_on("/held") == 1));
    owner.delete("/held").unwrap();

    waiter.join().unwrap().unwrap();
    assert_eq!(session.waiting_on("/held"), 0);
}

#[test]
fn ephemeral_discard_on_owner_expiry_releases_the_waiter() {
    let hub = roost_adapters::MemoryHub::new();
    let (owner, _owner_session) = open(&hub, "owner");
    let (_channel, session) = open(&hub, "waiter");
    settle(&session, SessionState::Connected);

    owner.create("/held", b"", CreateMode::Ephemeral).unwrap();

    let blocked = Arc::clone(&session);
    let waiter = thread::spawn(move || blocked.block_until_node_deleted("/held"));

    assert!(eventually(TICK, || session.waiting_on("/held") == 1));
    hub.expire(&owner);

    waiter.join().unwrap().unwrap();
}

#[test]
fn a_path_can_be_waited_on_again_after_recreation() {
    let hub = roost_adapters::MemoryHub::new();
    let (owner, _owner_session) = open(&hub, "owner");
    let (_channel, session) = open(&hub, "waiter");
    settle(&session, SessionState::Connected);

    for _ in 0..2 {
        owner.create("/held", b"", CreateMode::Persistent).unwrap();

        let blocked = Arc::clone(&session);
        let waiter = thread::spawn(move || blocked.block_until_node_deleted("/held"));
        assert!(eventually(TICK, || session.waiting_on("/held") == 1));

        owner.delete("/held").unwrap();
        waiter.join().unwrap().unwrap();
    }
}

#[test]
fn an_explicit_deadline_bounds_the_wait() {
    let hub = roost_adapters::MemoryHub::new();
    let (channel, session) = open(&hub, "bounded");
    settle(&session, SessionState::Connected);
    channel.create("/held", b"", CreateMode::Persistent).unwrap();

    let result =
        session.block_until_node_deleted_with_deadline("/held", Duration::from_millis(50));
    assert_eq!(
        result,
        Err(WaitError::Timeout {
            path: "/held".into()
        })
    );
    assert!(!result.unwrap_err().is_session_death());
}

#[test]
fn the_configured_default_deadline_applies() {
    let hub = roost_adapters::MemoryHub::new();
    let config = SessionConfig::new("bounded").with_default_deadline(Duration::from_millis(50));
    let (channel, session) = open_with(&hub, config);
    settle(&session, SessionState::Connected);
    channel.create("/held", b"", CreateMode::Persistent).unwrap();

    assert_eq!(
        session.block_until_node_deleted("/held"),
        Err(WaitError::Timeout {
            path: "/held".into()
        })
    );
}

#[test]
fn many_waiters_on_one_path_all_release() {
    let hub = roost_adapters::MemoryHub::new();
    let (owner, _owner_session) = open(&hub, "owner");
    let (_channel, session) = open(&hub, "crowd");
    settle(&session, SessionState::Connected);

    owner.create("/held", b"", CreateMode::Persistent).unwrap();

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let blocked = Arc::clone(&session);
            thread::spawn(move || blocked.block_until_node_deleted("/held"))
        })
        .collect();

    assert!(eventually(TICK, || session.waiting_on("/held") == 4));
    owner.delete("/held").unwrap();

    for waiter in waiters {
        waiter.join().unwrap().unwrap();
    }
}
