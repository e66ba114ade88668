use crate::models::{BatchResult, Trigger};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub considered: usize,
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_estimated_cost: f64,
    pub ledger_error: Option<String>,
}

impl From<&BatchResult> for BatchSummary {
    fn from(result: &BatchResult) -> Self {
        Self {
            run_id: result.run_id,
            trigger: result.trigger,
            started_at: result.started_at.with_timezone(&Utc),
            considered: result.considered,
            executed: result.executed(),
            succeeded: result.succeeded(),
            failed: result.failed(),
            total_estimated_cost: result.total_estimated_cost(),
            ledger_error: result.ledger_error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthSnapshot {
    pub ledger_ok: bool,
    pub broker_ok: bool,
    pub active_orders: Option<usize>,
    pub checked_at: DateTime<Utc>,
}

impl HealthSnapshot {
    pub fn is_healthy(&self) -> bool {
        self.ledger_ok && self.broker_ok
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct NextRuns {
    pub daily_batch: Option<DateTime<Utc>>,
    pub health_check: Option<DateTime<Utc>>,
    pub heartbeat: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServiceStatus {
    pub started_at: DateTime<Utc>,
    pub batch_running: bool,
    pub batches_run: u64,
    pub batches_rejected: u64,
    pub orders_executed: u64,
    pub orders_succeeded: u64,
    pub orders_failed: u64,
    pub last_batch: Option<BatchSummary>,
    pub next_runs: NextRuns,
    pub health: Option<HealthSnapshot>,
}

impl ServiceStatus {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            batch_running: false,
            batches_run: 0,
            batches_rejected: 0,
            orders_executed: 0,
            orders_succeeded: 0,
            orders_failed: 0,
            last_batch: None,
            next_runs: NextRuns::default(),
            health: None,
        }
    }
}

/// Shared status record; writers publish, readers take snapshots
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<ServiceStatus>,
}

impl StatusBoard {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        let (tx, _rx) = watch::channel(ServiceStatus::new(started_at));
        Self { tx }
    }

    pub fn snapshot(&self) -> ServiceStatus {
        self.tx.borrow().clone()
    }

    pub fn set_running(&self, running: bool) {
        self.tx.send_modify(|s| s.batch_running = running);
    }

    /// Flag a batch as running until the returned guard drops, panics included
    pub fn mark_running(&self) -> RunningMark<'_> {
        self.set_running(true);
        RunningMark { board: self }
    }

    pub fn record_batch(&self, result: &BatchResult) {
        self.tx.send_modify(|s| {
            s.batches_run += 1;
            s.orders_executed += result.executed() as u64;
            s.orders_succeeded += result.succeeded() as u64;
            s.orders_failed += result.failed() as u64;
            s.last_batch = Some(BatchSummary::from(result));
        });
    }

    pub fn record_rejection(&self) {
        self.tx.send_modify(|s| s.batches_rejected += 1);
    }

    pub fn record_health(&self, health: HealthSnapshot) {
        self.tx.send_modify(|s| s.health = Some(health));
    }

    pub fn update_next_runs(&self, update: impl FnOnce(&mut NextRuns)) {
        self.tx.send_modify(|s| update(&mut s.next_runs));
    }
}

pub struct RunningMark<'a> {
    board: &'a StatusBoard,
}

impl Drop for RunningMark<'_> {
    fn drop(&mut self) {
        self.board.set_running(false);
    }
}
