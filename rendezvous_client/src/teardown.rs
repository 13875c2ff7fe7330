//! Process teardown hooks
//!
//! The hosting application owns one [`Teardown`] and passes it to every
//! channel it opens. Each channel registers a hook for its lifetime and
//! deregisters on close, so nothing accumulates across open/close cycles.
//! Firing the teardown closes every channel still registered.

use crate::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Hooks {
    next_id: u64,
    tokens: HashMap<u64, CancellationToken>,
    fired: bool,
}

/// Registry of shutdown hooks for one process
#[derive(Debug, Clone, Default)]
pub struct Teardown {
    hooks: Arc<Mutex<Hooks>>,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel `token` when the teardown fires, until the registration drops
    ///
    /// Registering after the teardown fired cancels `token` right away.
    pub fn register(&self, token: CancellationToken) -> TeardownRegistration {
        let mut hooks = lock(&self.hooks);
        let id = hooks.next_id;
        hooks.next_id += 1;
        if hooks.fired {
            token.cancel();
        } else {
            hooks.tokens.insert(id, token);
        }
        TeardownRegistration {
            hooks: Arc::downgrade(&self.hooks),
            id,
        }
    }

    /// Run every registered hook
    pub fn fire(&self) {
        let tokens: Vec<CancellationToken> = {
            let mut hooks = lock(&self.hooks);
            hooks.fired = true;
            hooks.tokens.drain().map(|(_, token)| token).collect()
        };
        info!(hooks = tokens.len(), "process teardown");
        for token in tokens {
            token.cancel();
        }
    }

    pub fn is_fired(&self) -> bool {
        lock(&self.hooks).fired
    }

    /// Number of hooks currently registered
    pub fn registered(&self) -> usize {
        lock(&self.hooks).tokens.len()
    }

    /// Fire on Ctrl-C
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let teardown = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => teardown.fire(),
                Err(e) => warn!(error = %e, "unable to listen for ctrl-c"),
            }
        })
    }
}

/// Deregisters its hook when dropped
#[derive(Debug)]
pub struct TeardownRegistration {
    hooks: Weak<Mutex<Hooks>>,
    id: u64,
}

impl Drop for TeardownRegistration {
    fn drop(&mut self) {
        if let Some(hooks) = self.hooks.upgrade() {
            lock(&hooks).tokens.remove(&self.id);
        }
    }
}
