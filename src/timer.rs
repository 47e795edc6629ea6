//! Cancellable delayed tasks with restart-on-new-input semantics.
//!
//! A `TimerSlot` owns at most one pending task. Restarting the slot cancels
//! the previous task's token before spawning the new one, so a stale delay
//! can never race a fresh one.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Default)]
struct SlotState {
    generation: u64,
    pending: Option<CancellationToken>,
}

/// A single cancellable timer.
#[derive(Clone)]
pub struct TimerSlot {
    name: &'static str,
    state: Arc<Mutex<SlotState>>,
}

impl TimerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(SlotState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Schedule `task` to run after `delay`, superseding any pending task.
    ///
    /// Returns the generation of the new timer.
    pub fn restart<F>(&self, delay: Duration, task: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let generation = {
            let mut state = self.lock();
            if let Some(previous) = state.pending.replace(token.clone()) {
                previous.cancel();
                debug!(timer = self.name, "Pending timer superseded");
            }
            state.generation += 1;
            state.generation
        };

        let slot = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    slot.clear_if(generation);
                    task.await;
                }
            }
        });
        generation
    }

    /// Cancel the pending task, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        match self.lock().pending.take() {
            Some(token) => {
                token.cancel();
                debug!(timer = self.name, "Pending timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a task is scheduled and has not fired yet.
    pub fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    fn clear_if(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation == generation {
            state.pending = None;
        }
    }
}
