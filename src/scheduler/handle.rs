use super::SchedulerError;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Cloneable control surface of a running [`Scheduler`](super::Scheduler).
#[derive(Clone)]
pub struct SchedulerHandle {
    state: Arc<Mutex<SchedulerState>>,
    stop_token: CancellationToken,
}

impl SchedulerHandle {
    pub(super) fn new(stop_token: CancellationToken) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
            stop_token,
        }
    }

    /// Requests a graceful stop: the current cycle finishes, no new one starts.
    pub fn stop(&self) {
        {
            let mut state = self.lock();
            if matches!(*state, SchedulerState::Idle | SchedulerState::Running) {
                *state = SchedulerState::Stopping;
            }
        }
        if !self.stop_token.is_cancelled() {
            info!("Scheduler stop requested");
        }
        self.stop_token.cancel();
    }

    pub fn state(&self) -> SchedulerState {
        *self.lock()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop_token.is_cancelled()
    }

    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop_token
    }

    /// Idle -> Running. A stop requested before start is kept.
    pub(super) fn begin(&self) -> Result<(), SchedulerError> {
        let mut state = self.lock();
        match *state {
            SchedulerState::Idle => {
                *state = if self.stop_token.is_cancelled() {
                    SchedulerState::Stopping
                } else {
                    SchedulerState::Running
                };
                Ok(())
            }
            SchedulerState::Stopping => Ok(()),
            SchedulerState::Running | SchedulerState::Stopped => {
                Err(SchedulerError::AlreadyStarted)
            }
        }
    }

    pub(super) fn finish(&self) {
        *self.lock() = SchedulerState::Stopped;
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
