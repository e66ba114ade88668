use super::OrderLedger;
use crate::error::Error;
use crate::models::{ExecutionDetails, RecurringOrder};
use crate::Result;
use std::sync::Arc;

/// Appends one audit line per execution into the next free column of the order's row
#[derive(Clone)]
pub struct ResultLogger {
    ledger: Arc<dyn OrderLedger>,
}

impl ResultLogger {
    pub fn new(ledger: Arc<dyn OrderLedger>) -> Self {
        Self { ledger }
    }

    /// Best-effort: returns whether the line was written, never an error
    pub async fn log_execution(&self, order: &RecurringOrder, details: &ExecutionDetails) -> bool {
        match self.try_log(order, details).await {
            Ok((row, column)) => {
                tracing::debug!(symbol = %order.symbol, row, column, "Audit line written");
                true
            }
            Err(e) => {
                tracing::error!("❌ Failed to log execution for {}: {}", order.symbol, e);
                false
            }
        }
    }

    async fn try_log(
        &self,
        order: &RecurringOrder,
        details: &ExecutionDetails,
    ) -> Result<(usize, usize)> {
        let row = self
            .ledger
            .find_row_by_symbol(&order.symbol)
            .await?
            .ok_or_else(|| Error::Persistence(format!("no ledger row for {}", order.symbol)))?;

        let column = self.ledger.first_unused_column(row).await?;
        self.ledger
            .write_cell(row, column, &format_log_line(details))
            .await?;
        Ok((row, column))
    }
}

/// Render the audit cell for one execution
pub fn format_log_line(details: &ExecutionDetails) -> String {
    let timestamp = details.timestamp.format("%Y-%m-%d %H:%M:%S %Z");

    if !details.is_success() {
        let error = details.error.as_deref().unwrap_or("unknown error");
        return format!("❌ {}: FAILED - {}", timestamp, error);
    }

    let mut line = format!("✅ {}: {} shares", timestamp, details.target_quantity);
    if let Some(price) = details.market_price {
        line.push_str(&format!(" @ ${:.2}", price));
    }
    if let Some(cost) = details.estimated_cost {
        line.push_str(&format!(" (${:.2})", cost));
    }
    if let Some(id) = &details.order_id {
        line.push_str(&format!(" | ID: {}", id));
    }
    line
}
