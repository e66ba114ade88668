pub mod broker;
pub mod retry;

pub use broker::BrokerClient;
pub use retry::{retry_with_backoff, RetryPolicy};

use crate::Result;
use async_trait::async_trait;

/// Broker acknowledgement for an accepted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: Option<String>,
}

/// Trading API the orchestrator drives for each order
#[async_trait]
pub trait TradingApi: Send + Sync {
    /// Make sure the broker is reachable before a batch, retrying if needed
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// Symbol to the broker's contract identifier
    async fn resolve_symbol(&self, symbol: &str) -> Result<String>;

    /// Latest price for a contract
    async fn current_price(&self, contract_id: &str) -> Result<f64>;

    /// Market buy, day time-in-force
    async fn submit_market_buy(&self, contract_id: &str, quantity: u32) -> Result<OrderAck>;

    /// Whether the broker is reachable and connected to the brokerage
    async fn health(&self) -> bool;
}
