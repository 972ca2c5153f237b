//! Worker health checks.
//!
//! A background interval task pings the broker and the store and keeps the
//! latest report available for the operational surface. It runs beside the
//! dequeue loop and never blocks job processing.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use storygen_queue::WorkQueue;
use storygen_store::JobStore;

use crate::state::WorkerState;

/// Health status exposed for external monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub worker_id: String,
    pub running: bool,
    pub current_job: Option<String>,
    pub broker_healthy: bool,
    pub store_healthy: bool,
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
}

/// Periodic broker/store connectivity monitor.
pub struct HealthMonitor {
    worker_id: String,
    state: Arc<WorkerState>,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn JobStore>,
    interval: Duration,
    latest: RwLock<Option<HealthReport>>,
}

impl HealthMonitor {
    pub fn new(
        worker_id: impl Into<String>,
        state: Arc<WorkerState>,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn JobStore>,
        interval: Duration,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            state,
            queue,
            store,
            interval,
            latest: RwLock::new(None),
        }
    }

    /// Run one check cycle and record the report.
    pub async fn check(&self) -> HealthReport {
        let broker_healthy = self.queue.ping().await.is_ok();
        let store_healthy = self.store.ping().await.is_ok();

        let report = HealthReport {
            worker_id: self.worker_id.clone(),
            running: self.state.is_running(),
            current_job: self.state.current_job().map(|j| j.to_string()),
            broker_healthy,
            store_healthy,
            healthy: broker_healthy && store_healthy,
            timestamp: Utc::now(),
        };

        if report.healthy {
            debug!(worker_id = %report.worker_id, "Health check passed");
        } else {
            warn!(
                worker_id = %report.worker_id,
                broker_healthy = report.broker_healthy,
                store_healthy = report.store_healthy,
                "Health check degraded"
            );
        }

        *self.latest.write().unwrap() = Some(report.clone());
        report
    }

    /// The most recent report, if a check has run.
    pub fn latest(&self) -> Option<HealthReport> {
        self.latest.read().unwrap().clone()
    }

    /// Interval loop; exits on shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.check().await;
                }
            }
        }
    }
}
