//! Shared test helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc, Weekday};
use chrono_tz::America::New_York;
use recurbot::api::{OrderAck, TradingApi};
use recurbot::error::Error;
use recurbot::execution::Orchestrator;
use recurbot::ledger::{LedgerRow, MemoryLedger};
use recurbot::models::ColumnHeaders;
use recurbot::notify::{NotificationSink, Notifier, WebhookPayload};
use recurbot::schedule::{DailyTrigger, TradingCalendar};
use recurbot::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Broker fake with per-symbol failure injection
#[derive(Default)]
pub struct MockBroker {
    prices: HashMap<String, f64>,
    unresolvable: HashSet<String>,
    submit_errors: HashMap<String, String>,
    submit_delay: Duration,
    panic_on_submit: bool,
    submissions: Mutex<Vec<(String, u32)>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn unresolvable(mut self, symbol: &str) -> Self {
        self.unresolvable.insert(symbol.to_string());
        self
    }

    pub fn failing_submit(mut self, symbol: &str, error: &str) -> Self {
        self.submit_errors.insert(symbol.to_string(), error.to_string());
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn panicking_submit(mut self) -> Self {
        self.panic_on_submit = true;
        self
    }

    /// (symbol, quantity) of every submitted order, in order
    pub fn submissions(&self) -> Vec<(String, u32)> {
        self.submissions.lock().unwrap().clone()
    }
}

fn symbol_of(contract_id: &str) -> &str {
    contract_id.trim_start_matches("C-")
}

#[async_trait]
impl TradingApi for MockBroker {
    async fn resolve_symbol(&self, symbol: &str) -> Result<String> {
        if self.unresolvable.contains(symbol) {
            return Err(Error::Resolution {
                symbol: symbol.to_string(),
                reason: "No contract found".to_string(),
            });
        }
        Ok(format!("C-{}", symbol))
    }

    async fn current_price(&self, contract_id: &str) -> Result<f64> {
        self.prices
            .get(symbol_of(contract_id))
            .copied()
            .ok_or_else(|| Error::Price("no market data".to_string()))
    }

    async fn submit_market_buy(&self, contract_id: &str, quantity: u32) -> Result<OrderAck> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        if self.panic_on_submit {
            panic!("broker client bug");
        }
        let symbol = symbol_of(contract_id).to_string();
        if let Some(error) = self.submit_errors.get(&symbol) {
            return Err(Error::Submission(error.clone()));
        }

        let mut submissions = self.submissions.lock().unwrap();
        submissions.push((symbol, quantity));
        Ok(OrderAck {
            order_id: Some(format!("ORD-{}", submissions.len())),
        })
    }

    async fn health(&self) -> bool {
        true
    }
}

/// Captures every outbound message
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<WebhookPayload>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<WebhookPayload> {
        self.messages.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_message(&self, payload: &WebhookPayload) -> Result<()> {
        self.messages.lock().unwrap().push(payload.clone());
        if self.fail {
            return Err(Error::Notification("webhook down".to_string()));
        }
        Ok(())
    }
}

pub fn order_row(index: usize, symbol: &str, qty: &str, frequency: &str) -> LedgerRow {
    LedgerRow::new(index)
        .with("Status", "Active")
        .with("Stock Symbol", symbol)
        .with("Price", "")
        .with("Amount", "")
        .with("Qty to buy", qty)
        .with("Frequency", frequency)
}

/// AAPL x5 daily and TSLA x3 weekly
pub fn sample_rows() -> Vec<LedgerRow> {
    vec![order_row(2, "AAPL", "5", "Daily"), order_row(3, "TSLA", "3", "Weekly")]
}

/// Wednesday 2024-01-03 09:00 New York, not a week-start day
pub fn wednesday_morning() -> DateTime<Utc> {
    New_York
        .with_ymd_and_hms(2024, 1, 3, 9, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn monday_morning() -> DateTime<Utc> {
    New_York
        .with_ymd_and_hms(2024, 1, 8, 9, 0, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub broker: Arc<MockBroker>,
    pub ledger: Arc<MemoryLedger>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(rows: Vec<LedgerRow>, broker: MockBroker) -> Harness {
    harness_with_sink(rows, broker, RecordingSink::default())
}

pub fn harness_with_sink(rows: Vec<LedgerRow>, broker: MockBroker, sink: RecordingSink) -> Harness {
    let broker = Arc::new(broker);
    let ledger = Arc::new(MemoryLedger::new(rows));
    let sink = Arc::new(sink);
    let calendar = TradingCalendar::new(New_York, Weekday::Mon);
    let notifier = Notifier::new(sink.clone(), calendar, "Recurring Orders Bot", 5);

    let orchestrator = Arc::new(Orchestrator::new(
        broker.clone(),
        ledger.clone(),
        ColumnHeaders::default(),
        notifier,
        calendar,
        DailyTrigger::new(9, 0, New_York, chrono::Duration::minutes(5)),
        Duration::from_millis(5),
    ));

    Harness {
        orchestrator,
        broker,
        ledger,
        sink,
    }
}
