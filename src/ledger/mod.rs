pub mod memory;
pub mod reader;
pub mod result_logger;
pub mod sheets;

pub use memory::MemoryLedger;
pub use reader::{parse_row, read_orders};
pub use result_logger::{format_log_line, ResultLogger};
pub use sheets::SheetsLedger;

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// One data row of the ledger keyed by header name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerRow {
    /// 1-based row number; row 1 holds the headers
    pub index: usize,
    pub cells: HashMap<String, String>,
}

impl LedgerRow {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            cells: HashMap::new(),
        }
    }

    pub fn with(mut self, header: &str, value: &str) -> Self {
        self.cells.insert(header.to_string(), value.to_string());
        self
    }

    /// Cell text, empty when the column is missing
    pub fn get(&self, header: &str) -> &str {
        self.cells.get(header).map(String::as_str).unwrap_or("")
    }
}

/// Tabular store holding the recurring order definitions and their audit trail
#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn read_all_rows(&self) -> Result<Vec<LedgerRow>>;

    /// First row whose symbol cell matches, case-insensitive
    async fn find_row_by_symbol(&self, symbol: &str) -> Result<Option<usize>>;

    /// Lowest column index after every occupied cell in the row
    async fn first_unused_column(&self, row: usize) -> Result<usize>;

    async fn write_cell(&self, row: usize, column: usize, value: &str) -> Result<()>;
}
