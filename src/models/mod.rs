use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Whether a ledger row is switched on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Active,
    Inactive,
}

impl OrderStatus {
    /// Anything other than "active" (case-insensitive) counts as inactive
    pub fn from_cell(text: &str) -> Self {
        if text.trim().eq_ignore_ascii_case("active") {
            OrderStatus::Active
        } else {
            OrderStatus::Inactive
        }
    }
}

/// How often a recurring order should be placed
///
/// Cells that don't name a known cadence are kept verbatim in `Unrecognized`
/// so the eligibility check can stay total over everything the ledger holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Unrecognized(String),
}

impl Frequency {
    pub fn from_cell(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "daily" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "monthly" => Frequency::Monthly,
            _ => Frequency::Unrecognized(text.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
            Frequency::Unrecognized(text) => text.as_str(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse used for CLI filters: only the three real cadences
impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Frequency::from_cell(s) {
            Frequency::Unrecognized(text) => Err(format!(
                "unknown frequency '{}' (expected daily, weekly or monthly)",
                text
            )),
            known => Ok(known),
        }
    }
}

/// One row of the order ledger
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringOrder {
    pub row: usize, // 1-based ledger row the order was read from
    pub status: OrderStatus,
    pub symbol: String, // Uppercased ticker
    pub reference_price: Option<f64>,  // Informational only
    pub reference_amount: Option<f64>, // Informational only
    pub quantity: u32,                 // Exact number of shares to buy
    pub frequency: Frequency,
    pub log: String,
}

impl RecurringOrder {
    pub fn is_valid_for_execution(&self) -> bool {
        self.status == OrderStatus::Active && !self.symbol.is_empty() && self.quantity > 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Outcome of one order within one batch run
///
/// Built only through [`ExecutionDetails::success`] and
/// [`ExecutionDetails::failure`] so that `error` is present iff the order failed.
#[derive(Debug, Clone)]
pub struct ExecutionDetails {
    pub symbol: String,
    pub target_quantity: u32,
    pub frequency: Frequency,
    pub timestamp: DateTime<Tz>,
    pub market_price: Option<f64>,
    pub estimated_cost: Option<f64>,
    pub order_id: Option<String>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
}

impl ExecutionDetails {
    pub fn success(
        order: &RecurringOrder,
        timestamp: DateTime<Tz>,
        market_price: Option<f64>,
        order_id: Option<String>,
    ) -> Self {
        Self {
            order_id,
            status: ExecutionStatus::Success,
            error: None,
            ..Self::base(order, timestamp, market_price)
        }
    }

    pub fn failure(
        order: &RecurringOrder,
        timestamp: DateTime<Tz>,
        market_price: Option<f64>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            order_id: None,
            status: ExecutionStatus::Failed,
            error: Some(error.into()),
            ..Self::base(order, timestamp, market_price)
        }
    }

    fn base(order: &RecurringOrder, timestamp: DateTime<Tz>, market_price: Option<f64>) -> Self {
        // A zero or negative quote is as good as no quote
        let market_price = market_price.filter(|p| *p > 0.0);
        Self {
            symbol: order.symbol.clone(),
            target_quantity: order.quantity,
            frequency: order.frequency.clone(),
            timestamp,
            market_price,
            estimated_cost: market_price.map(|p| p * order.quantity as f64),
            order_id: None,
            status: ExecutionStatus::Failed,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// What started a batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub trigger: Trigger,
    /// Restrict the run to one cadence
    pub frequency: Option<Frequency>,
}

impl BatchRequest {
    pub fn scheduled() -> Self {
        Self {
            trigger: Trigger::Scheduled,
            frequency: None,
        }
    }

    pub fn manual() -> Self {
        Self {
            trigger: Trigger::Manual,
            frequency: None,
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

/// Aggregate over one batch run
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub run_id: Uuid,
    pub trigger: Trigger,
    pub started_at: DateTime<Tz>,
    /// Valid active orders read from the ledger
    pub considered: usize,
    /// One entry per executed order, in ledger row order
    pub details: Vec<ExecutionDetails>,
    /// Valid orders that were not due this run
    pub skipped: Vec<RecurringOrder>,
    pub next_check: Option<DateTime<Tz>>,
    /// Set when the ledger could not be read; nothing was executed
    pub ledger_error: Option<String>,
}

impl BatchResult {
    pub fn executed(&self) -> usize {
        self.details.len()
    }

    pub fn succeeded(&self) -> usize {
        self.details.iter().filter(|d| d.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.executed() - self.succeeded()
    }

    /// Sum of estimated cost over successful buys with a known price
    pub fn total_estimated_cost(&self) -> f64 {
        self.details
            .iter()
            .filter(|d| d.is_success())
            .filter_map(|d| d.estimated_cost)
            .sum()
    }
}

/// Header names of the ledger columns
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ColumnHeaders {
    pub status: String,
    pub symbol: String,
    pub price: String,
    pub amount: String,
    pub quantity: String,
    pub frequency: String,
    pub log: String,
}

impl Default for ColumnHeaders {
    fn default() -> Self {
        Self {
            status: "Status".to_string(),
            symbol: "Stock Symbol".to_string(),
            price: "Price".to_string(),
            amount: "Amount".to_string(),
            quantity: "Qty to buy".to_string(),
            frequency: "Frequency".to_string(),
            log: "Log".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    fn order(symbol: &str, quantity: u32) -> RecurringOrder {
        RecurringOrder {
            row: 2,
            status: OrderStatus::Active,
            symbol: symbol.to_string(),
            reference_price: None,
            reference_amount: None,
            quantity,
            frequency: Frequency::Daily,
            log: String::new(),
        }
    }

    #[test]
    fn test_frequency_from_cell() {
        assert_eq!(Frequency::from_cell(" Weekly "), Frequency::Weekly);
        assert_eq!(Frequency::from_cell("DAILY"), Frequency::Daily);
        assert_eq!(
            Frequency::from_cell("fortnightly"),
            Frequency::Unrecognized("fortnightly".to_string())
        );
    }

    #[test]
    fn test_frequency_from_str_rejects_unknown() {
        assert_eq!("monthly".parse::<Frequency>(), Ok(Frequency::Monthly));
        assert!("yearly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_validity_requires_active_symbol_and_quantity() {
        assert!(order("AAPL", 5).is_valid_for_execution());
        assert!(!order("", 5).is_valid_for_execution());
        assert!(!order("AAPL", 0).is_valid_for_execution());

        let mut inactive = order("AAPL", 5);
        inactive.status = OrderStatus::Inactive;
        assert!(!inactive.is_valid_for_execution());
    }

    #[test]
    fn test_success_details_compute_cost() {
        let ts = New_York.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let details =
            ExecutionDetails::success(&order("AAPL", 5), ts, Some(190.0), Some("42".to_string()));

        assert!(details.is_success());
        assert_eq!(details.estimated_cost, Some(950.0));
        assert!(details.error.is_none());
    }

    #[test]
    fn test_failure_details_carry_error_and_ignore_zero_price() {
        let ts = New_York.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let details = ExecutionDetails::failure(&order("TSLA", 3), ts, Some(0.0), "timeout");

        assert_eq!(details.status, ExecutionStatus::Failed);
        assert_eq!(details.error.as_deref(), Some("timeout"));
        assert_eq!(details.market_price, None);
        assert_eq!(details.estimated_cost, None);
    }

    #[test]
    fn test_batch_counts() {
        let ts = New_York.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        let result = BatchResult {
            run_id: Uuid::new_v4(),
            trigger: Trigger::Manual,
            started_at: ts,
            considered: 3,
            details: vec![
                ExecutionDetails::success(&order("AAPL", 5), ts, Some(100.0), None),
                ExecutionDetails::success(&order("MSFT", 1), ts, None, None),
                ExecutionDetails::failure(&order("TSLA", 3), ts, Some(200.0), "rejected"),
            ],
            skipped: vec![],
            next_check: None,
            ledger_error: None,
        };

        assert_eq!(result.executed(), 3);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.failed(), 1);
        // Failed TSLA is excluded even though its price is known
        assert_eq!(result.total_estimated_cost(), 500.0);
    }
}
