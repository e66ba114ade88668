use super::lock::BatchLock;
use super::status::{HealthSnapshot, StatusBoard};
use crate::config::ScheduleSettings;
use crate::error::Error;
use crate::execution::Orchestrator;
use crate::models::{BatchRequest, BatchResult};
use crate::schedule::FireDecision;
use crate::Result;
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Longest single sleep while waiting for the daily trigger
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Owns the periodic jobs and the guarantee that at most one batch runs at a time
pub struct Supervisor {
    orchestrator: Arc<Orchestrator>,
    lock: BatchLock,
    status: StatusBoard,
    health_interval: Duration,
    heartbeat_interval: Duration,
    quiet_start: u32,
    quiet_end: u32,
}

impl Supervisor {
    pub fn new(orchestrator: Arc<Orchestrator>, schedule: &ScheduleSettings) -> Self {
        Self {
            orchestrator,
            lock: BatchLock::new(),
            status: StatusBoard::new(Utc::now()),
            health_interval: Duration::from_secs(schedule.health_interval_secs),
            heartbeat_interval: Duration::from_secs(schedule.heartbeat_interval_secs),
            quiet_start: schedule.heartbeat_quiet_start,
            quiet_end: schedule.heartbeat_quiet_end,
        }
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn is_batch_running(&self) -> bool {
        self.lock.is_running()
    }

    /// Start a batch in the background, or reject it if one is already in flight
    pub fn try_start_batch(self: &Arc<Self>, request: BatchRequest) -> Result<JoinHandle<BatchResult>> {
        let Some(permit) = self.lock.try_acquire() else {
            tracing::warn!("⏳ {} batch rejected: a batch is already running", request.trigger);
            self.status.record_rejection();
            return Err(Error::AlreadyRunning);
        };

        self.status.set_running(true);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _permit = permit;
            let _running = this.status.mark_running();
            let result = this.orchestrator.run_batch(request).await;
            this.status.record_batch(&result);
            result
        }))
    }

    /// Run a batch on the current task, under the same guard
    pub async fn run_batch_now(&self, request: BatchRequest) -> Result<BatchResult> {
        let Some(_permit) = self.lock.try_acquire() else {
            self.status.record_rejection();
            return Err(Error::AlreadyRunning);
        };

        let _running = self.status.mark_running();
        let result = self.orchestrator.run_batch(request).await;
        self.status.record_batch(&result);
        Ok(result)
    }

    /// Probe ledger and broker and record the outcome
    pub async fn health_check(&self) -> HealthSnapshot {
        let (orders, broker_ok) = tokio::join!(
            self.orchestrator.read_orders(),
            self.orchestrator.api().health()
        );

        let active_orders = match &orders {
            Ok(orders) => Some(orders.len()),
            Err(e) => {
                tracing::error!("💔 Health check: ledger unreachable: {}", e);
                None
            }
        };
        if !broker_ok {
            tracing::warn!("💔 Health check: broker not connected");
        }

        let snapshot = HealthSnapshot {
            ledger_ok: orders.is_ok(),
            broker_ok,
            active_orders,
            checked_at: Utc::now(),
        };
        tracing::debug!("🏥 Health check: {:?}", snapshot);
        self.status.record_health(snapshot.clone());
        snapshot
    }

    /// Send the periodic status message unless `now` falls in quiet hours
    pub async fn heartbeat(&self, now: DateTime<Utc>) -> bool {
        let tz = self.orchestrator.calendar().timezone();
        let hour = now.with_timezone(&tz).hour();
        if !heartbeat_allowed(hour, self.quiet_start, self.quiet_end) {
            tracing::debug!("Heartbeat suppressed during quiet hours ({}:00)", hour);
            return false;
        }

        let status = self.status.snapshot();
        let active = match self.orchestrator.read_orders().await {
            Ok(orders) => orders.len().to_string(),
            Err(e) => {
                tracing::error!("📊 Heartbeat could not read ledger: {}", e);
                "unknown".to_string()
            }
        };
        let next = self
            .orchestrator
            .daily_trigger()
            .next_fire_after(now)
            .with_timezone(&tz);

        let message = format!(
            "📊 **Hourly Status Report**\n⏰ Uptime: {}\n📈 Batches: {} (✅ {} / ❌ {} orders)\n📋 Active Orders: {}\n🕘 Next Check: {}",
            format_uptime(now - status.started_at),
            status.batches_run,
            status.orders_succeeded,
            status.orders_failed,
            active,
            next.format("%A %I:%M %p %Z")
        );
        self.orchestrator.notifier().notify_simple(&message, false).await
    }

    /// Fire the scheduled batch every day; misfires are skipped, never caught up
    pub async fn daily_loop(self: Arc<Self>) {
        let trigger = *self.orchestrator.daily_trigger();
        loop {
            let scheduled = trigger.next_fire_after(Utc::now());
            self.status.update_next_runs(|n| n.daily_batch = Some(scheduled));
            tracing::info!("📅 Next scheduled batch at {}", scheduled);

            sleep_until(scheduled).await;

            match trigger.check_fire(scheduled, Utc::now()) {
                FireDecision::Fire => match self.try_start_batch(BatchRequest::scheduled()) {
                    Ok(handle) => {
                        if let Err(e) = handle.await {
                            tracing::error!("Scheduled batch task failed: {}", e);
                        }
                    }
                    Err(e) => tracing::warn!("Skipping scheduled batch: {}", e),
                },
                FireDecision::Misfired { late_by } => {
                    tracing::warn!(
                        "⚠️ Missed scheduled batch at {} by {}s, waiting for the next slot",
                        scheduled,
                        late_by.num_seconds()
                    );
                }
            }
        }
    }

    pub async fn health_loop(self: Arc<Self>) {
        let mut interval = interval_at(Instant::now() + self.health_interval, self.health_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            self.schedule_next(|n, at| n.health_check = Some(at), self.health_interval);
            interval.tick().await;
            self.health_check().await;
        }
    }

    pub async fn heartbeat_loop(self: Arc<Self>) {
        let mut interval =
            interval_at(Instant::now() + self.heartbeat_interval, self.heartbeat_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            self.schedule_next(|n, at| n.heartbeat = Some(at), self.heartbeat_interval);
            interval.tick().await;
            self.heartbeat(Utc::now()).await;
        }
    }

    fn schedule_next(
        &self,
        set: impl FnOnce(&mut super::status::NextRuns, DateTime<Utc>),
        period: Duration,
    ) {
        let at = Utc::now() + chrono::Duration::from_std(period).unwrap_or_else(|_| chrono::Duration::zero());
        self.status.update_next_runs(|n| set(n, at));
    }

    /// Run every job plus the status surface until ctrl-c
    pub async fn run(self: Arc<Self>, bind: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .map_err(|e| Error::Configuration(format!("cannot bind {}: {}", bind, e)))?;
        tracing::info!("📊 Status API listening on http://{}", bind);

        let router = super::server::create_router(self.clone());
        let server_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Status API stopped: {}", e);
            }
        });

        self.health_check().await;

        let daily_task = tokio::spawn(self.clone().daily_loop());
        let health_task = tokio::spawn(self.clone().health_loop());
        let heartbeat_task = tokio::spawn(self.clone().heartbeat_loop());

        let tz = self.orchestrator.calendar().timezone();
        let now = Utc::now();
        let next = self
            .orchestrator
            .daily_trigger()
            .next_fire_after(now)
            .with_timezone(&tz);
        let startup = format!(
            "🚀 **Recurring Orders Service Started**\n⏰ Started at: {}\n📅 Next execution: {}\n📊 Status API: http://{}/service/status",
            now.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z"),
            next.format("%Y-%m-%d %H:%M %Z"),
            bind
        );
        self.orchestrator.notifier().notify_simple(&startup, false).await;
        tracing::info!("✅ Service running, press Ctrl+C to stop");

        tokio::select! {
            signal = shutdown_signal() => {
                tracing::info!("🛑 {} received, shutting down gracefully...", signal);
            }
            _ = daily_task => {
                tracing::error!("Daily batch loop exited unexpectedly");
            }
            _ = health_task => {
                tracing::error!("Health check loop exited unexpectedly");
            }
            _ = heartbeat_task => {
                tracing::error!("Heartbeat loop exited unexpectedly");
            }
            _ = server_task => {
                tracing::error!("Status API task exited unexpectedly");
            }
        }

        let status = self.status.snapshot();
        let shutdown = format!(
            "🛑 **Recurring Orders Service Stopped**\n⏰ Uptime: {}\n📊 Total Batches: {}\n✅ Orders Succeeded: {} | ❌ Orders Failed: {}",
            format_uptime(Utc::now() - status.started_at),
            status.batches_run,
            status.orders_succeeded,
            status.orders_failed
        );
        self.orchestrator.notifier().notify_simple(&shutdown, false).await;
        tracing::info!("👋 Service shutdown complete");
        Ok(())
    }
}

/// Ctrl+C, or SIGTERM from a process supervisor on unix
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match terminate_listener() {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    }
}

#[cfg(unix)]
fn terminate_listener() -> std::io::Result<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
}

async fn sleep_until(target: DateTime<Utc>) {
    // Short hops so wall-clock jumps (suspend, NTP) are noticed
    loop {
        let remaining = target - Utc::now();
        let Ok(remaining) = remaining.to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
    }
}

/// Heartbeats go out between `quiet_end:00` and the end of `quiet_start`, local time
pub fn heartbeat_allowed(hour: u32, quiet_start: u32, quiet_end: u32) -> bool {
    if quiet_end <= quiet_start {
        hour >= quiet_end && hour <= quiet_start
    } else {
        hour >= quiet_end || hour <= quiet_start
    }
}

pub fn format_uptime(uptime: chrono::Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}
