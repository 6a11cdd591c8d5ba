//! Cancellation and deadline plumbing.
//!
//! One [`ExecControl`] is shared between the shell executor, the WASI
//! host and every native tool. It is checked at each syscall entry, each
//! suspension resume and between builtin loop iterations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::ExitSignal;

#[derive(Default)]
struct ControlState {
    cancelled: AtomicBool,
    /// Epoch nanoseconds; zero means no deadline.
    deadline: AtomicU64,
}

/// Shared cancel flag + deadline.
#[derive(Clone, Default)]
pub struct ExecControl {
    state: Arc<ControlState>,
}

impl ExecControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flags cancellation; takes effect at the next checkpoint.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Relaxed);
    }

    /// Sets an absolute deadline in epoch nanoseconds.
    pub fn set_deadline(&self, epoch_nanos: u64) {
        self.state.deadline.store(epoch_nanos, Ordering::Relaxed);
    }

    /// Resets both signals; called at the start of each `run()`.
    pub fn reset(&self) {
        self.state.cancelled.store(false, Ordering::Relaxed);
        self.state.deadline.store(0, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Relaxed)
    }

    pub fn deadline_expired(&self) -> bool {
        let deadline = self.state.deadline.load(Ordering::Relaxed);
        deadline != 0 && wasmbox_vfs::now_nanos() >= deadline
    }

    /// The checkpoint: raises the typed exit signal when tripped.
    pub fn check(&self) -> Result<(), ExitSignal> {
        if self.is_cancelled() {
            return Err(ExitSignal::Cancelled);
        }
        if self.deadline_expired() {
            return Err(ExitSignal::Timeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_trips_the_checkpoint() {
        let control = ExecControl::new();
        assert_eq!(control.check(), Ok(()));
        control.cancel();
        assert_eq!(control.check(), Err(ExitSignal::Cancelled));
        control.reset();
        assert_eq!(control.check(), Ok(()));
    }

    #[test]
    fn past_deadline_reads_as_timeout() {
        let control = ExecControl::new();
        control.set_deadline(1);
        assert_eq!(control.check(), Err(ExitSignal::Timeout));
        control.reset();
        assert_eq!(control.check(), Ok(()));
    }

    #[test]
    fn cancellation_wins_over_timeout() {
        let control = ExecControl::new();
        control.set_deadline(1);
        control.cancel();
        assert_eq!(control.check(), Err(ExitSignal::Cancelled));
    }
}
