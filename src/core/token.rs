//! Per-visit cancellation tokens.
//!
//! Every time a state becomes current it mints a fresh [`VisitToken`] and
//! shares it with the triggers it activates. Leaving the state revokes the
//! token, which rejects every trip still in flight from that occupancy.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_VISIT: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Visit {
    id: u64,
    revoked: AtomicBool,
}

/// Cancellation handle for one occupancy of a state.
///
/// Clones share the same revocation flag.
#[derive(Clone)]
pub struct VisitToken {
    inner: Arc<Visit>,
}

impl VisitToken {
    pub(crate) fn mint() -> Self {
        Self {
            inner: Arc::new(Visit {
                id: NEXT_VISIT.fetch_add(1, Ordering::Relaxed),
                revoked: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique visit number, useful in logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_revoked(&self) -> bool {
        self.inner.revoked.load(Ordering::Acquire)
    }

    /// Revoke the token. Returns `true` if this call performed the revocation.
    pub(crate) fn revoke(&self) -> bool {
        !self.inner.revoked.swap(true, Ordering::AcqRel)
    }

    /// Whether two handles refer to the same visit.
    pub fn same_visit(&self, other: &VisitToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for VisitToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisitToken")
            .field("id", &self.inner.id)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

impl Serialize for VisitToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.inner.id)
    }
}
