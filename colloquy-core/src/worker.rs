//! Worker-thread shutdown helpers.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::warn;

/// Ceiling applied to every worker join during shutdown.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Join `handle`, giving up after `timeout`.
///
/// A missed join is logged and the thread is left detached; shutdown must
/// not hang on a stuck worker.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration, name: &str) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(worker = name, "join timed out during shutdown");
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if handle.join().is_err() {
        warn!(worker = name, "worker panicked before shutdown");
    }
}
