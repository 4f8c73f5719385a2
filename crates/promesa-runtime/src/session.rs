//! Process-wide session identity.
//!
//! The session UUID is generated once, on first use, and never changes. It
//! is the basis of every [`ContextId`] and [`FutureId`] the process hands
//! out, so ownership comparisons are exact equality on these ids.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use serde::Serialize;
use uuid::Uuid;

static SESSION: OnceLock<Session> = OnceLock::new();

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    next_context: AtomicU64,
    next_future: AtomicU64,
}

/// Identity of an execution context: the top-level program (sequence 0) or
/// one forced evaluation of a captured expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContextId {
    pub session: Uuid,
    pub seq: u64,
}

/// Identity of a future: owner session plus a per-session sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FutureId {
    pub session: Uuid,
    pub seq: u64,
}

impl Session {
    pub fn global() -> &'static Session {
        SESSION.get_or_init(|| {
            let session = Session {
                id: Uuid::new_v4(),
                next_context: AtomicU64::new(1),
                next_future: AtomicU64::new(1),
            };
            tracing::debug!(session = %session.id, "session initialized");
            session
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The context of the top-level program.
    pub fn root_context(&self) -> ContextId {
        ContextId {
            session: self.id,
            seq: 0,
        }
    }

    pub fn new_context(&self) -> ContextId {
        ContextId {
            session: self.id,
            seq: self.next_context.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn next_future_id(&self) -> FutureId {
        FutureId {
            session: self.id,
            seq: self.next_future.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/ctx-{}", self.session, self.seq)
    }
}

impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.session, self.seq)
    }
}
