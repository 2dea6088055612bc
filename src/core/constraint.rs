//! Named boolean predicates used as transition guards and trigger filters.
//!
//! A [`Constraint`] wraps a predicate together with a human readable name
//! and remembers the outcome of its most recent evaluation. Guards are
//! `Constraint<()>`; trigger filters receive the event payload.

use super::error::{panic_message, BoxError, MachineError, Result};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const UNKNOWN: u8 = 0;
const HELD: u8 = 1;
const FAILED: u8 = 2;

type Predicate<A> = Arc<dyn Fn(&A) -> std::result::Result<bool, BoxError> + Send + Sync>;

/// Transition guard: a constraint that needs no event payload.
pub type Guard = Constraint<()>;

/// Named predicate with last-result caching.
///
/// # Example
///
/// ```rust
/// use turnstile::core::Constraint;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let count = Arc::new(AtomicUsize::new(1));
/// let reading = Arc::clone(&count);
/// let guard = Constraint::new("count == 1", move |_: &()| reading.load(Ordering::SeqCst) == 1);
///
/// assert!(guard.check().unwrap());
/// count.store(0, Ordering::SeqCst);
/// assert!(!guard.check().unwrap());
/// assert_eq!(guard.last_result(), Some(false));
/// ```
pub struct Constraint<A = ()> {
    name: String,
    predicate: Predicate<A>,
    last: AtomicU8,
}

impl<A> Constraint<A> {
    /// Create a constraint from an infallible predicate.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        A: 'static,
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        Self::fallible(name, move |args: &A| Ok(predicate(args)))
    }

    /// Create a constraint whose predicate may fail to evaluate.
    pub fn fallible<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&A) -> std::result::Result<bool, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            last: AtomicU8::new(UNKNOWN),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Result of the most recent successful evaluation, if any.
    pub fn last_result(&self) -> Option<bool> {
        match self.last.load(Ordering::Acquire) {
            HELD => Some(true),
            FAILED => Some(false),
            _ => None,
        }
    }

    /// Evaluate the predicate against `args`.
    ///
    /// An error or panic raised by the predicate is logged and returned as
    /// [`MachineError::GuardFault`]; the cached result is cleared.
    pub fn evaluate(&self, args: &A) -> Result<bool> {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.predicate)(args)));
        let message = match outcome {
            Ok(Ok(held)) => {
                self.last
                    .store(if held { HELD } else { FAILED }, Ordering::Release);
                return Ok(held);
            }
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        self.last.store(UNKNOWN, Ordering::Release);
        tracing::error!(constraint = %self.name, error = %message, "constraint evaluation faulted");
        Err(MachineError::GuardFault {
            guard: self.name.clone(),
            message,
        })
    }
}

impl Constraint<()> {
    /// Evaluate a payload-free constraint.
    pub fn check(&self) -> Result<bool> {
        self.evaluate(&())
    }
}

impl<A> Clone for Constraint<A> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            predicate: Arc::clone(&self.predicate),
            last: AtomicU8::new(self.last.load(Ordering::Acquire)),
        }
    }
}

impl<A> fmt::Debug for Constraint<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("name", &self.name)
            .field("last_result", &self.last_result())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn constraint_reports_predicate_outcome() {
        let guard = Guard::new("always", |_| true);
        assert!(guard.check().unwrap());

        let guard = Guard::new("never", |_| false);
        assert!(!guard.check().unwrap());
    }

    #[test]
    fn last_result_is_cached() {
        let guard = Guard::new("never", |_| false);
        assert_eq!(guard.last_result(), None);

        guard.check().unwrap();
        assert_eq!(guard.last_result(), Some(false));
    }

    #[test]
    fn filter_sees_event_payload() {
        let filter: Constraint<u32> = Constraint::new("even", |n: &u32| n % 2 == 0);

        assert!(filter.evaluate(&4).unwrap());
        assert!(!filter.evaluate(&7).unwrap());
    }

    #[test]
    fn predicate_error_becomes_guard_fault() {
        let guard = Guard::fallible("broken", |_| Err("sensor offline".into()));

        match guard.check() {
            Err(MachineError::GuardFault { guard, message }) => {
                assert_eq!(guard, "broken");
                assert_eq!(message, "sensor offline");
            }
            other => panic!("expected guard fault, got {other:?}"),
        }
        assert_eq!(guard.last_result(), None);
    }

    #[test]
    fn predicate_panic_becomes_guard_fault() {
        let guard = Guard::new("panics", |_| panic!("bad guard"));

        let err = guard.check().unwrap_err();
        assert!(err.to_string().contains("bad guard"));
    }

    #[test]
    fn constraint_reads_shared_state() {
        let count = Arc::new(AtomicUsize::new(0));
        let reading = Arc::clone(&count);
        let guard = Guard::new("count == 1", move |_| reading.load(Ordering::SeqCst) == 1);

        assert!(!guard.check().unwrap());
        count.store(1, Ordering::SeqCst);
        assert!(guard.check().unwrap());
    }

    #[test]
    fn clone_shares_predicate() {
        let guard = Guard::new("always", |_| true);
        guard.check().unwrap();

        let cloned = guard.clone();
        assert_eq!(cloned.name(), "always");
        assert_eq!(cloned.last_result(), Some(true));
    }
}
