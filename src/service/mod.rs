//! Long-running service: cron-style jobs, the single-batch guard and the status surface.

pub mod lock;
pub mod server;
pub mod status;
pub mod supervisor;

pub use lock::{BatchLock, BatchPermit};
pub use server::create_router;
pub use status::{BatchSummary, HealthSnapshot, NextRuns, ServiceStatus, StatusBoard};
pub use supervisor::{format_uptime, heartbeat_allowed, Supervisor};
