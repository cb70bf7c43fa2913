//! Progress reporting and cooperative cancellation of running chains
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::score::ScoreKind;

/// A snapshot of a running chain, emitted at every report tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// The outer (EM) iteration, starting at 0
    pub outer_iteration: usize,
    /// The step of the inner chain
    pub step: usize,
    /// The acceptance probability of the most recent proposal
    pub acceptance_probability: f64,
    /// Accepted proposals of the current chain so far
    pub accepts: u64,
    /// The score of the current state
    pub score: f64,
}

/// Receives notifications about a running calculation
///
/// All methods default to doing nothing. Implementations are called from the
/// sampling thread and must return quickly.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use mgsa::mcmc::{ProgressEvent, ProgressObserver};
///
/// #[derive(Default)]
/// struct Counter(AtomicUsize);
///
/// impl ProgressObserver for Counter {
///     fn progress(&self, _event: &ProgressEvent) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ProgressObserver: Sync {
    /// A chain with `total_steps` steps is about to start
    fn init(&self, _total_steps: usize) {}

    /// The chain reached `step`
    fn update(&self, _step: usize) {}

    /// Detailed state of the chain
    fn progress(&self, _event: &ProgressEvent) {}

    /// A score state of the given kind was allocated
    fn score_state_created(&self, _kind: ScoreKind) {}
}

/// An observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Forwards events into a channel without ever blocking
///
/// Events are dropped if a bounded channel is full or the receiver is gone.
impl ProgressObserver for Sender<ProgressEvent> {
    fn progress(&self, event: &ProgressEvent) {
        if self.try_send(*event).is_err() {
            tracing::trace!("progress event of step {} dropped", event.step);
        }
    }
}

/// A flag to stop running chains early
///
/// Clones share the same flag. Chains check it at every report tick
/// and return what they recorded so far.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once [`CancelToken::cancel`] was called on any clone
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn channel_never_blocks() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let event = ProgressEvent {
            outer_iteration: 0,
            step: 1,
            acceptance_probability: 0.5,
            accepts: 1,
            score: -3.0,
        };
        tx.progress(&event);
        tx.progress(&ProgressEvent { step: 2, ..event });
        assert_eq!(rx.try_recv(), Ok(event));
        assert!(rx.try_recv().is_err());

        drop(rx);
        tx.progress(&event);
    }
}
