// Core modules
pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod models;
pub mod notify;
pub mod schedule;
pub mod service;

// Re-export commonly used types
pub use api::{BrokerClient, TradingApi};
pub use config::Settings;
pub use error::Error;
pub use execution::Orchestrator;
pub use ledger::{OrderLedger, SheetsLedger};
pub use models::*;
pub use notify::{DiscordWebhook, NotificationSink, Notifier};
pub use service::Supervisor;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;
