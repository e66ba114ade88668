use crate::api::TradingApi;
use crate::ledger::{read_orders, OrderLedger, ResultLogger};
use crate::models::{
    BatchRequest, BatchResult, ColumnHeaders, ExecutionDetails, RecurringOrder, Trigger,
};
use crate::notify::Notifier;
use crate::schedule::{DailyTrigger, TradingCalendar};
use crate::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Where an order was in its lifecycle when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStage {
    Connecting,
    Resolving,
    Pricing,
    Submitting,
}

impl std::fmt::Display for OrderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStage::Connecting => write!(f, "connecting"),
            OrderStage::Resolving => write!(f, "resolving"),
            OrderStage::Pricing => write!(f, "pricing"),
            OrderStage::Submitting => write!(f, "submitting"),
        }
    }
}

/// Reads the ledger, picks the due orders and places them one at a time
///
/// A batch never fails as a whole: per-order errors become `Failed` details,
/// and persistence and notification problems are logged and dropped.
pub struct Orchestrator {
    api: Arc<dyn TradingApi>,
    ledger: Arc<dyn OrderLedger>,
    headers: ColumnHeaders,
    result_logger: ResultLogger,
    notifier: Notifier,
    calendar: TradingCalendar,
    daily_trigger: DailyTrigger,
    inter_order_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn TradingApi>,
        ledger: Arc<dyn OrderLedger>,
        headers: ColumnHeaders,
        notifier: Notifier,
        calendar: TradingCalendar,
        daily_trigger: DailyTrigger,
        inter_order_delay: Duration,
    ) -> Self {
        Self {
            result_logger: ResultLogger::new(ledger.clone()),
            api,
            ledger,
            headers,
            notifier,
            calendar,
            daily_trigger,
            inter_order_delay,
        }
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn api(&self) -> &Arc<dyn TradingApi> {
        &self.api
    }

    pub fn daily_trigger(&self) -> &DailyTrigger {
        &self.daily_trigger
    }

    /// All valid active orders currently in the ledger
    pub async fn read_orders(&self) -> Result<Vec<RecurringOrder>> {
        read_orders(self.ledger.as_ref(), &self.headers).await
    }

    pub async fn run_batch(&self, request: BatchRequest) -> BatchResult {
        self.run_batch_at(request, Utc::now()).await
    }

    /// Run one batch as if the clock read `now`
    pub async fn run_batch_at(&self, request: BatchRequest, now: DateTime<Utc>) -> BatchResult {
        let tz = self.calendar.timezone();
        let mut result = BatchResult {
            run_id: Uuid::new_v4(),
            trigger: request.trigger,
            started_at: now.with_timezone(&tz),
            considered: 0,
            details: Vec::new(),
            skipped: Vec::new(),
            next_check: Some(self.daily_trigger.next_fire_after(now).with_timezone(&tz)),
            ledger_error: None,
        };

        tracing::info!(
            run_id = %result.run_id,
            "🔄 Starting {} batch{}",
            request.trigger,
            request
                .frequency
                .as_ref()
                .map(|f| format!(" ({} only)", f))
                .unwrap_or_default()
        );

        let orders = match self.read_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!("❌ Could not read order ledger: {}", e);
                result.ledger_error = Some(e.to_string());
                self.notifier.notify_batch(&result).await;
                return result;
            }
        };
        result.considered = orders.len();

        let (due, skipped) = self.partition_due(orders, &request, now);
        result.skipped = skipped;

        if due.is_empty() {
            tracing::info!("📭 No orders due ({} checked)", result.considered);
        } else {
            tracing::info!("📈 {} of {} orders due", due.len(), result.considered);
        }

        // One retried connect per batch; a failure here fails the due orders
        // without reaching the broker again
        let broker_down = if due.is_empty() {
            None
        } else {
            match self.api.connect().await {
                Ok(()) => None,
                Err(e) => {
                    tracing::error!("❌ Broker unavailable, failing {} due orders: {}", due.len(), e);
                    Some(e.to_string())
                }
            }
        };

        let timestamp = result.started_at;
        for (i, order) in due.iter().enumerate() {
            let details = match &broker_down {
                Some(reason) => {
                    self.failed(order, timestamp, None, OrderStage::Connecting, reason.clone())
                }
                None => {
                    if i > 0 && !self.inter_order_delay.is_zero() {
                        tokio::time::sleep(self.inter_order_delay).await;
                    }
                    self.execute_order(order, timestamp).await
                }
            };
            result.details.push(details);
        }

        // Audit lines go out only once every order has a terminal state
        for (order, details) in due.iter().zip(&result.details) {
            self.result_logger.log_execution(order, details).await;
        }

        tracing::info!(
            run_id = %result.run_id,
            "🏁 Batch complete: {} executed, {} succeeded, {} failed",
            result.executed(),
            result.succeeded(),
            result.failed()
        );

        self.notifier.notify_batch(&result).await;
        result
    }

    /// Split orders into (due, skipped), both in ledger order
    ///
    /// Orders outside the requested frequency are in neither list.
    fn partition_due(
        &self,
        orders: Vec<RecurringOrder>,
        request: &BatchRequest,
        now: DateTime<Utc>,
    ) -> (Vec<RecurringOrder>, Vec<RecurringOrder>) {
        orders
            .into_iter()
            .filter(|order| {
                request
                    .frequency
                    .as_ref()
                    .map_or(true, |filter| &order.frequency == filter)
            })
            .partition(|order| match request.trigger {
                Trigger::Manual => true,
                Trigger::Scheduled => self.calendar.is_due_today(&order.frequency, now),
            })
    }

    async fn execute_order(&self, order: &RecurringOrder, timestamp: DateTime<Tz>) -> ExecutionDetails {
        tracing::info!(
            "🎯 Executing {}: {} shares ({})",
            order.symbol,
            order.quantity,
            order.frequency
        );

        let contract_id = match self.api.resolve_symbol(&order.symbol).await {
            Ok(id) => id,
            Err(e) => return self.failed(order, timestamp, None, OrderStage::Resolving, e.to_string()),
        };

        let price = match self.api.current_price(&contract_id).await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!(
                    "Could not get market price for {} while {}: {}",
                    order.symbol,
                    OrderStage::Pricing,
                    e
                );
                None
            }
        };

        match self.api.submit_market_buy(&contract_id, order.quantity).await {
            Ok(ack) => {
                let details = ExecutionDetails::success(order, timestamp, price, ack.order_id);
                tracing::info!(
                    "✅ Order placed: {} x{}{}{}",
                    order.symbol,
                    order.quantity,
                    details
                        .estimated_cost
                        .map(|c| format!(" (~${:.2})", c))
                        .unwrap_or_default(),
                    details
                        .order_id
                        .as_ref()
                        .map(|id| format!(" | ID: {}", id))
                        .unwrap_or_default()
                );
                details
            }
            Err(e) => self.failed(order, timestamp, price, OrderStage::Submitting, e.to_string()),
        }
    }

    fn failed(
        &self,
        order: &RecurringOrder,
        timestamp: DateTime<Tz>,
        price: Option<f64>,
        stage: OrderStage,
        error: String,
    ) -> ExecutionDetails {
        tracing::error!("❌ {} failed while {}: {}", order.symbol, stage, error);
        ExecutionDetails::failure(order, timestamp, price, error)
    }
}
