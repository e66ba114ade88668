use super::{LedgerRow, OrderLedger};
use crate::error::Error;
use crate::models::{ColumnHeaders, Frequency, OrderStatus, RecurringOrder};
use crate::Result;

/// Read every valid active order, in ledger row order
///
/// Malformed or inactive rows are dropped; only an unreadable ledger is an error.
pub async fn read_orders(
    ledger: &dyn OrderLedger,
    headers: &ColumnHeaders,
) -> Result<Vec<RecurringOrder>> {
    let rows = ledger.read_all_rows().await?;
    let total = rows.len();

    let mut orders = Vec::new();
    for row in &rows {
        match parse_row(row, headers) {
            Ok(order) if order.is_valid_for_execution() => orders.push(order),
            Ok(order) => {
                tracing::debug!(row = row.index, symbol = %order.symbol, "Skipping inactive or empty row");
            }
            Err(e) => {
                tracing::debug!(row = row.index, "Skipping row: {}", e);
            }
        }
    }

    tracing::info!("📋 Read {} valid orders from {} ledger rows", orders.len(), total);
    Ok(orders)
}

pub fn parse_row(row: &LedgerRow, headers: &ColumnHeaders) -> Result<RecurringOrder> {
    let symbol = row.get(&headers.symbol).trim().to_uppercase();

    let quantity_cell = row.get(&headers.quantity).trim();
    let quantity = parse_quantity(quantity_cell).ok_or_else(|| {
        Error::Validation(format!(
            "row {}: quantity '{}' is not a positive whole number",
            row.index, quantity_cell
        ))
    })?;

    Ok(RecurringOrder {
        row: row.index,
        status: OrderStatus::from_cell(row.get(&headers.status)),
        reference_price: parse_money(row, &headers.price),
        reference_amount: parse_money(row, &headers.amount),
        quantity,
        frequency: Frequency::from_cell(row.get(&headers.frequency)),
        log: row.get(&headers.log).to_string(),
        symbol,
    })
}

/// Whole share counts only; "5.0" is accepted, "2.5" is not
fn parse_quantity(cell: &str) -> Option<u32> {
    if let Ok(n) = cell.parse::<u32>() {
        return (n > 0).then_some(n);
    }
    let value = cell.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value >= 1.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

/// Informational money cell; unparseable text degrades to `None` with a warning
fn parse_money(row: &LedgerRow, header: &str) -> Option<f64> {
    let raw = row.get(header).trim();
    if raw.is_empty() {
        return None;
    }
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    match cleaned.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            tracing::warn!(row = row.index, "Could not parse {} '{}'", header, raw);
            None
        }
    }
}
