use thiserror::Error;

/// Failure taxonomy for the recurring order engine.
///
/// Only `Configuration` is allowed to stop the process, and only at startup.
/// Everything else is scoped to a single row, order, or auxiliary step.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed ledger row; that row is skipped.
    #[error("Invalid ledger row: {0}")]
    Validation(String),

    /// The ledger could not be read at all.
    #[error("Ledger unavailable: {0}")]
    Ledger(String),

    #[error("Could not resolve {symbol}: {reason}")]
    Resolution { symbol: String, reason: String },

    /// Price lookup failed; degrades to "price unknown".
    #[error("Price unavailable: {0}")]
    Price(String),

    /// Brokerage session could not be established.
    #[error("Broker unavailable: {0}")]
    Broker(String),

    #[error("Order submission failed: {0}")]
    Submission(String),

    /// Audit line could not be written back to the ledger.
    #[error("Ledger write failed: {0}")]
    Persistence(String),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("A batch is already running")]
    AlreadyRunning,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// True for transport-level failures where the remote side was never reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Http(e) if e.is_connect() || e.is_timeout())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Configuration(e.to_string())
    }
}
