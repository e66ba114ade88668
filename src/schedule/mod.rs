// Eligibility and daily trigger timing
pub mod eligibility;
pub mod trigger;

pub use eligibility::TradingCalendar;
pub use trigger::{DailyTrigger, FireDecision};
