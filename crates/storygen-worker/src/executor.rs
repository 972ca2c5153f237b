//! The dequeue loop.
//!
//! One blocking, single-flight loop per worker process: claim a delivery,
//! run it to a terminal state, settle it, repeat. Scale-out is more
//! processes sharing the consumer group, not in-process parallelism. The
//! pop timeout is the loop's breathing room: it bounds shutdown latency and
//! gives the background health/reclaim tasks a quiet broker connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use storygen_models::{JobStatus, JobStatusSnapshot, StatusEvent};
use storygen_queue::{Delivery, ProgressSink, WorkQueue};
use storygen_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::health::{HealthMonitor, HealthReport};
use crate::processor::{run_job, ProcessorContext};
use crate::retry::FailureTracker;
use crate::stage::ExecutorRegistry;
use crate::state::WorkerState;

/// Job executor that processes deliveries from the queue.
pub struct JobExecutor {
    ctx: ProcessorContext,
    queue: Arc<dyn WorkQueue>,
    state: Arc<WorkerState>,
    health: Arc<HealthMonitor>,
    shutdown: watch::Sender<bool>,
}

impl JobExecutor {
    /// Create a new job executor over injected dependencies.
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn JobStore>,
        progress: Arc<dyn ProgressSink>,
        executors: ExecutorRegistry,
    ) -> Self {
        let state = Arc::new(WorkerState::new());
        let (shutdown, _) = watch::channel(false);
        let health = Arc::new(HealthMonitor::new(
            config.worker_id.clone(),
            Arc::clone(&state),
            Arc::clone(&queue),
            Arc::clone(&store),
            config.health_interval,
        ));

        Self {
            ctx: ProcessorContext {
                config,
                store,
                progress,
                executors,
            },
            queue,
            state,
            health,
            shutdown,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.ctx.config.worker_id
    }

    pub fn state(&self) -> Arc<WorkerState> {
        Arc::clone(&self.state)
    }

    /// Latest health report, if a check has run.
    pub fn health(&self) -> Option<HealthReport> {
        self.health.latest()
    }

    /// Signal shutdown. Safe to call from a signal handler task.
    pub fn shutdown(&self) {
        self.state.request_shutdown();
        let _ = self.shutdown.send(true);
    }

    /// Run the dequeue loop until shutdown.
    pub async fn run(&self) -> WorkerResult<()> {
        let worker_id = self.ctx.config.worker_id.clone();
        info!("Starting worker '{}'", worker_id);
        self.state.set_running(true);

        let health_task = tokio::spawn(Arc::clone(&self.health).run(self.shutdown.subscribe()));
        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.ctx.store),
            worker_id.clone(),
            self.ctx.config.claim_interval,
            self.ctx.config.claim_min_idle,
            self.ctx.config.claim_batch,
            self.shutdown.subscribe(),
        ));

        let mut tracker = FailureTracker::new(3);
        while !self.state.is_shutdown_requested() {
            match self.queue.fetch(&worker_id, self.ctx.config.poll_block).await {
                Ok(Some(delivery)) => {
                    tracker.record_success();
                    self.handle_delivery(delivery).await;
                }
                Ok(None) => {
                    // Pop timeout with an empty queue; loop around and
                    // re-check the shutdown flag.
                    tracker.record_success();
                }
                Err(e) => {
                    // Broker unreachable at dequeue time: keep the loop
                    // alive, back off, and let the health check surface it.
                    if tracker.record_failure() {
                        warn!("Queue fetch failed: {}", e);
                    }
                    tokio::time::sleep(self.ctx.config.poll_block).await;
                }
            }
        }

        self.state.set_running(false);
        claim_task.abort();
        health_task.abort();
        info!("Worker '{}' stopped", worker_id);
        Ok(())
    }

    /// Process one delivery, racing it against the shutdown signal.
    async fn handle_delivery(&self, delivery: Delivery) {
        let job_id = delivery.job.job_id.clone();
        self.state.set_current_job(Some(job_id.clone()));

        // Signal may have landed between the fetch returning and this point.
        if self.state.is_shutdown_requested() {
            self.requeue_in_flight(&delivery).await;
            self.state.set_current_job(None);
            return;
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::select! {
            result = run_job(&self.ctx, &delivery.job) => {
                match result {
                    Ok(outcome) => {
                        info!(job_id = %job_id, outcome = ?outcome, "Job settled");
                        if let Err(e) = self.queue.ack(&delivery.message_id).await {
                            error!(job_id = %job_id, "Failed to ack delivery: {}", e);
                        }
                    }
                    Err(e) => {
                        // Infrastructure failure mid-job: leave the delivery
                        // pending so it is reclaimed once the dependency
                        // recovers. The job must not crash the worker.
                        error!(job_id = %job_id, "Job processing aborted: {}", e);
                    }
                }
            }
            _ = shutdown_signalled(&mut shutdown_rx) => {
                self.requeue_in_flight(&delivery).await;
            }
        }

        self.state.set_current_job(None);
    }

    /// Hand the in-flight job back: persisted status to `pending`, a fresh
    /// delivery on the queue, and a status event. No job is dropped on a
    /// signal-initiated shutdown.
    async fn requeue_in_flight(&self, delivery: &Delivery) {
        let job_id = &delivery.job.job_id;

        // The pipeline may have finished in the instant the signal landed;
        // a terminal job is settled, not requeued.
        if let Ok(Some(job)) = self.ctx.store.get_job(job_id).await {
            if job.status.is_terminal() {
                if let Err(e) = self.queue.ack(&delivery.message_id).await {
                    error!(job_id = %job_id, "Failed to ack delivery: {}", e);
                }
                return;
            }
        }

        warn!(job_id = %job_id, "Shutdown requested mid-job, requeueing");

        if let Err(e) = self.ctx.store.mark_job_pending(job_id).await {
            error!(job_id = %job_id, "Failed to mark job pending: {}", e);
        }
        if let Err(e) = self.queue.requeue(&delivery.message_id, &delivery.job).await {
            error!(job_id = %job_id, "Failed to requeue delivery: {}", e);
        }

        let event = StatusEvent::new(
            job_id.clone(),
            JobStatus::Pending,
            self.ctx.config.worker_id.as_str(),
        );
        if let Err(e) = self.ctx.progress.publish_status(&event).await {
            warn!("Failed to publish requeue status event: {}", e);
        }

        let mut snapshot = JobStatusSnapshot::new(job_id.as_str());
        snapshot.requeue();
        if let Err(e) = self.ctx.progress.put_snapshot(&snapshot).await {
            warn!("Failed to write requeue snapshot: {}", e);
        }
    }

    /// Interval scan reclaiming deliveries from dead consumers. Reclaimed
    /// jobs go back to `pending` and re-enter the queue so any live worker
    /// picks them up through the normal loop.
    async fn claim_loop(
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn JobStore>,
        worker_id: String,
        interval: Duration,
        min_idle: Duration,
        batch: usize,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match queue.claim_stale(&worker_id, min_idle, batch).await {
                        Ok(deliveries) if !deliveries.is_empty() => {
                            info!("Reclaimed {} stale deliveries", deliveries.len());
                            for delivery in deliveries {
                                let job_id = delivery.job.job_id.clone();
                                if let Err(e) = store.mark_job_pending(&job_id).await {
                                    error!(job_id = %job_id, "Failed to reset reclaimed job: {}", e);
                                    continue;
                                }
                                if let Err(e) =
                                    queue.requeue(&delivery.message_id, &delivery.job).await
                                {
                                    error!(job_id = %job_id, "Failed to requeue reclaimed job: {}", e);
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Stale delivery scan failed: {}", e),
                    }
                }
            }
        }
    }
}

/// Resolve once the shutdown flag flips to true.
async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    // Sender gone without a shutdown: never resolves, the select's other
    // arm finishes the delivery.
    std::future::pending::<()>().await;
}
