// SPDX-License-Identifier: MIT

//! Session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name used for the dispatch thread and log fields
    pub name: String,
    /// Prefix for sequential lock bid nodes
    pub lock_prefix: String,
    /// Default deadline applied to blocking waits and lock acquisition.
    /// `None` blocks indefinitely.
    #[serde(default, with = "humantime_serde::option")]
    pub default_deadline: Option<Duration>,
}

impl SessionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lock_prefix: "lock-".to_string(),
            default_deadline: None,
        }
    }

    pub fn with_lock_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_prefix = prefix.into();
        self
    }

    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new("roost")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
