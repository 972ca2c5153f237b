//! Process-local worker state.
//!
//! Shared between the dequeue loop, the signal handler, and the health
//! monitor. Never persisted; it dies with the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use storygen_models::JobId;

/// Run-loop state visible to the shutdown handler and health monitor.
#[derive(Debug, Default)]
pub struct WorkerState {
    running: AtomicBool,
    shutdown_requested: AtomicBool,
    current_job: Mutex<Option<JobId>>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Record the job this worker currently holds, so the shutdown handler
    /// knows whether a requeue is needed.
    pub fn set_current_job(&self, job_id: Option<JobId>) {
        *self.current_job.lock().unwrap() = job_id;
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.current_job.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_lifecycle() {
        let state = WorkerState::new();
        assert!(!state.is_running());
        assert!(!state.is_shutdown_requested());
        assert!(state.current_job().is_none());

        state.set_running(true);
        state.set_current_job(Some(JobId::from_string("job-1")));
        assert!(state.is_running());
        assert_eq!(state.current_job().unwrap().as_str(), "job-1");

        state.request_shutdown();
        assert!(state.is_shutdown_requested());

        state.set_current_job(None);
        assert!(state.current_job().is_none());
    }
}
