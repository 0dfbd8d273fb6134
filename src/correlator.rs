//! Single-slot request/response correlation.
//!
//! At most one request may wait for a response at a time. The slot is an
//! explicit state machine shared between the caller issuing the request and
//! the read loop delivering trees:
//!
//! ```text
//!          reserve            arm
//!   Idle ──────────► Reserved ───► Awaiting { cmd, deadline, resolver }
//!    ▲                  ▲  ▲            │
//!    │  drop            │  └── disarm ──┤ (timeout)
//!    └── Reservation    └──── offer ────┘ (matching tree resolves)
//! ```
//!
//! A second `reserve` while the slot is not `Idle` fails immediately. A tree
//! arriving after the attempt's deadline no longer resolves it.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{BmapError, DeviceError, Result};
use crate::protocol::PacketTree;

/// What a waiting request is resolved with.
pub(crate) type Resolution = std::result::Result<PacketTree, DeviceError>;

#[derive(Debug)]
enum WaiterState {
    Idle,
    Reserved {
        cmd: u16,
    },
    Awaiting {
        cmd: u16,
        deadline: Instant,
        resolver: oneshot::Sender<Resolution>,
    },
}

impl WaiterState {
    fn cmd(&self) -> Option<u16> {
        match self {
            Self::Idle => None,
            Self::Reserved { cmd } | Self::Awaiting { cmd, .. } => Some(*cmd),
        }
    }
}

/// Shared handle to the pending-request slot.
#[derive(Debug, Clone)]
pub struct Correlator {
    state: Arc<Mutex<WaiterState>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(WaiterState::Idle)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WaiterState> {
        // Transitions never panic mid-update, so a poisoned lock still holds
        // a consistent state.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the slot for `cmd`.
    ///
    /// The slot is released when the returned [`Reservation`] is dropped.
    ///
    /// # Errors
    ///
    /// Returns `RequestPending` if another request holds the slot.
    pub fn reserve(&self, cmd: u16) -> Result<Reservation> {
        let mut state = self.lock();
        if let Some(pending) = state.cmd() {
            return Err(BmapError::RequestPending {
                pending,
                requested: cmd,
            });
        }
        *state = WaiterState::Reserved { cmd };
        Ok(Reservation {
            correlator: self.clone(),
            cmd,
        })
    }

    /// Command id of the request holding the slot, if any.
    pub fn pending(&self) -> Option<u16> {
        self.lock().cmd()
    }

    /// Whether an attempt is currently waiting for its response.
    pub fn is_awaiting(&self) -> bool {
        matches!(*self.lock(), WaiterState::Awaiting { .. })
    }

    /// Deliver a tree to the waiting request if its command id matches.
    ///
    /// Returns whether the tree resolved a request.
    pub fn offer(&self, tree: &PacketTree) -> bool {
        self.resolve(tree.cmd, || Ok(tree.clone()))
    }

    /// Fail the waiting request with a device error if its command id matches.
    pub fn offer_error(&self, error: &DeviceError) -> bool {
        self.resolve(error.cmd, || Err(error.clone()))
    }

    /// Wake the waiting request without a response.
    ///
    /// Used on shutdown; the request observes a dropped resolver.
    pub fn abandon(&self) {
        let mut state = self.lock();
        if let WaiterState::Awaiting { cmd, .. } = *state {
            *state = WaiterState::Reserved { cmd };
        }
    }

    fn resolve(&self, cmd: u16, resolution: impl FnOnce() -> Resolution) -> bool {
        let mut state = self.lock();
        match &*state {
            WaiterState::Awaiting {
                cmd: waiting,
                deadline,
                ..
            } if *waiting == cmd => {
                if Instant::now() > *deadline {
                    tracing::debug!("Late response for 0x{:04x} ignored", cmd);
                    return false;
                }
            }
            _ => return false,
        }
        let WaiterState::Awaiting { resolver, .. } =
            std::mem::replace(&mut *state, WaiterState::Reserved { cmd })
        else {
            return false;
        };
        // The receiver may already be gone if the attempt timed out at the
        // same instant; the request then retries.
        resolver.send(resolution()).is_ok()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of the pending-request slot for one command id.
#[derive(Debug)]
pub struct Reservation {
    correlator: Correlator,
    cmd: u16,
}

impl Reservation {
    /// Command id this reservation waits for.
    #[inline]
    pub fn cmd(&self) -> u16 {
        self.cmd
    }

    /// Start waiting for a response until `deadline`.
    ///
    /// Replaces the resolver of a previous attempt.
    pub(crate) fn arm(&self, deadline: Instant) -> oneshot::Receiver<Resolution> {
        let (resolver, rx) = oneshot::channel();
        *self.correlator.lock() = WaiterState::Awaiting {
            cmd: self.cmd,
            deadline,
            resolver,
        };
        rx
    }

    /// Stop waiting after a timed-out attempt, keeping the slot.
    pub(crate) fn disarm(&self) {
        *self.correlator.lock() = WaiterState::Reserved { cmd: self.cmd };
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        *self.correlator.lock() = WaiterState::Idle;
    }
}
