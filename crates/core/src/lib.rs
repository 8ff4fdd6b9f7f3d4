// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! roost-core: client-side coordination over a watch-based node store
//!
//! This crate provides:
//! - A single-threaded event dispatcher serializing all watch and
//!   connection-state notifications
//! - A session state machine that propagates session death to every
//!   blocked waiter
//! - Blocking waits on path conditions, safe against missed wakeups
//! - A distributed mutual-exclusion lock built from sequential ephemeral
//!   nodes

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod lock;
pub mod session;
pub mod state;
pub mod waiter;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports
pub use channel::{CreateMode, NodeChannel};
pub use config::SessionConfig;
pub use dispatch::{DispatchIdentity, EventDispatcher, HandlerToken};
pub use error::{ChannelError, LockError, SessionError, WaitError};
pub use event::{event_queue, EventReceiver, EventSender, NodeEventKind, SessionEvent};
pub use lock::{LockGuard, LockService};
pub use session::Session;
pub use state::{SessionState, StateEffect, StateTracker};
pub use waiter::WaitRegistry;
