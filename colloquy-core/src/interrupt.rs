//! Interruption protocol shared across the pipeline.
//!
//! One atomic flag pair, owned by the orchestrator and handed out as an
//! `Arc`. Lifecycle per turn:
//!
//! 1. The recognizer observes a speech-start transition while a reply is in
//!    flight and raises the interrupt flag.
//! 2. The orchestrator forwards the resulting transcript to the conversant
//!    and clears the flag, so the upcoming reply is not interrupted by its
//!    own cause.
//! 3. While the flag is raised, the playback callback drains its ring and
//!    the speaker drains all queued replies.
//!
//! In wait mode the flag exists but is never consulted by the player;
//! interruption is structurally impossible because the microphone is
//! paused during playback.
//!
//! Plain atomics, not a mutex: the two bits have no consistency
//! relationship with any other data.

use std::sync::atomic::{AtomicBool, Ordering};

/// Shared interrupt + busy state.
#[derive(Debug, Default)]
pub struct InterruptController {
    /// New user speech arrived; the in-flight reply should be abandoned.
    interrupt: AtomicBool,
    /// A reply is pending or playing.
    busy: AtomicBool,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the interrupt flag. Called by the recognizer on a
    /// speech-start transition while busy, and by `interrupt()` requests.
    pub fn raise(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Clear the interrupt flag. Called when the new transcript is handed
    /// to the conversant.
    pub fn clear(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Mark whether a reply is currently pending or playing.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Raise the flag only if a reply is in flight. Returns whether the
    /// flag was raised.
    pub fn raise_if_busy(&self) -> bool {
        if self.is_busy() {
            self.raise();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_if_busy_only_fires_while_busy() {
        let ctrl = InterruptController::new();
        assert!(!ctrl.raise_if_busy());
        assert!(!ctrl.is_raised());

        ctrl.set_busy(true);
        assert!(ctrl.raise_if_busy());
        assert!(ctrl.is_raised());
    }

    #[test]
    fn clear_resets_the_flag_but_not_busy() {
        let ctrl = InterruptController::new();
        ctrl.set_busy(true);
        ctrl.raise();
        ctrl.clear();
        assert!(!ctrl.is_raised());
        assert!(ctrl.is_busy());
    }
}
