use super::{LedgerRow, OrderLedger};
use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// In-process ledger for dry runs and tests
///
/// Audit writes are kept per (row, column) alongside the seeded rows.
pub struct MemoryLedger {
    rows: RwLock<Vec<LedgerRow>>,
    writes: RwLock<BTreeMap<(usize, usize), String>>,
    history: RwLock<Vec<(usize, usize, String)>>,
    symbol_header: String,
    log_start_column: usize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryLedger {
    pub fn new(rows: Vec<LedgerRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
            writes: RwLock::new(BTreeMap::new()),
            history: RwLock::new(Vec::new()),
            symbol_header: "Stock Symbol".to_string(),
            log_start_column: 7,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every successful write in the order it happened
    pub fn write_history(&self) -> Vec<(usize, usize, String)> {
        self.history.read().map(|h| h.clone()).unwrap_or_default()
    }

    /// Written cells of one row, left to right
    pub fn row_log(&self, row: usize) -> Vec<(usize, String)> {
        self.writes
            .read()
            .map(|w| {
                w.iter()
                    .filter(|((r, _), _)| *r == row)
                    .map(|((_, c), v)| (*c, v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn poisoned() -> Error {
        Error::Ledger("memory ledger lock poisoned".to_string())
    }
}

#[async_trait]
impl OrderLedger for MemoryLedger {
    async fn read_all_rows(&self) -> Result<Vec<LedgerRow>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Ledger("ledger unreachable".to_string()));
        }
        Ok(self.rows.read().map_err(|_| Self::poisoned())?.clone())
    }

    async fn find_row_by_symbol(&self, symbol: &str) -> Result<Option<usize>> {
        let rows = self.read_all_rows().await?;
        Ok(rows
            .iter()
            .find(|r| r.get(&self.symbol_header).trim().eq_ignore_ascii_case(symbol))
            .map(|r| r.index))
    }

    async fn first_unused_column(&self, row: usize) -> Result<usize> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Ledger("ledger unreachable".to_string()));
        }
        let writes = self.writes.read().map_err(|_| Self::poisoned())?;
        let last = writes
            .keys()
            .filter(|(r, _)| *r == row)
            .map(|(_, c)| *c)
            .max()
            .unwrap_or(0);
        Ok((last + 1).max(self.log_start_column))
    }

    async fn write_cell(&self, row: usize, column: usize, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Persistence("write rejected".to_string()));
        }
        self.writes
            .write()
            .map_err(|_| Self::poisoned())?
            .insert((row, column), value.to_string());
        self.history
            .write()
            .map_err(|_| Self::poisoned())?
            .push((row, column, value.to_string()));
        Ok(())
    }
}
