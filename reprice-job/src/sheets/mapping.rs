//! Conversion between sheet cells and domain values.
//!
//! # Products sheet
//!
//! Row 1 is a header. Columns, in order:
//! number, brand, description, stock, price, updated_date, turnover_ratio,
//! norm_stock, product_group, rule, select_flag, id_rule.
//!
//! # Rules sheet
//!
//! `C2` holds the quota and `C3` the staleness threshold in days. From row 5
//! down, column B is a turnover bucket and column C its threshold.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use reprice_common::{Error, Result};
use tracing::warn;

use super::client::ValueRange;
use crate::policy::RulesSheet;
use crate::record::{Record, DEFAULT_UPDATED_DATE};

/// Field names of the products sheet columns, in sheet order.
pub const PRODUCT_COLUMNS: [&str; 12] = [
    "number",
    "brand",
    "description",
    "stock",
    "price",
    "updated_date",
    "turnover_ratio",
    "norm_stock",
    "product_group",
    "rule",
    "select_flag",
    "id_rule",
];

/// Date format used by the sheet.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// First row of the bucket table on the rules sheet (1-based).
pub const BUCKET_TABLE_START_ROW: usize = 5;

/// Value written into the marker column for selected rows.
pub const MARKER_VALUE: &str = "1";

// ============================================================================
// Products
// ============================================================================

/// Map every data row of the products sheet to a record.
pub fn parse_products(rows: &[Vec<String>]) -> Vec<Record> {
    rows.iter()
        .enumerate()
        .skip(1)
        .map(|(i, row)| parse_product_row(row, i + 1))
        .collect()
}

/// Map one sheet row; `row_index` is its 1-based position on the sheet.
pub fn parse_product_row(row: &[String], row_index: usize) -> Record {
    let cell = |col: usize| row.get(col).map(|v| v.trim()).unwrap_or_default().to_string();
    let price = cell(4);

    Record {
        number: cell(0),
        brand: cell(1),
        description: cell(2),
        stock: cell(3),
        price: if price.is_empty() { None } else { Some(price) },
        updated_date: convert_date(&cell(5), row_index),
        turnover_ratio: convert_turn_ratio(&cell(6)),
        norm_stock: cell(7),
        product_group: cell(8),
        rule: cell(9),
        select_flag: cell(10),
        id_rule: cell(11),
        row_index,
    }
}

/// Parse a `DD.MM.YYYY` cell; blank or malformed cells give 2024-01-01.
pub fn convert_date(raw: &str, row_index: usize) -> NaiveDate {
    let raw = raw.trim();
    if raw.is_empty() {
        return DEFAULT_UPDATED_DATE;
    }

    NaiveDate::parse_from_str(raw, DATE_FORMAT).unwrap_or_else(|e| {
        warn!(row = row_index, value = raw, error = %e, "Unparseable date, using default");
        DEFAULT_UPDATED_DATE
    })
}

/// Parse a turnover ratio such as `k12` into `12.0`.
///
/// A leading non-numeric category letter is stripped. Empty or malformed
/// cells give `0.0`. A decimal comma is accepted.
pub fn convert_turn_ratio(raw: &str) -> f64 {
    let raw = raw.trim();
    let digits = match raw.chars().next() {
        Some(c) if !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | ',')) => {
            &raw[c.len_utf8()..]
        }
        _ => raw,
    };

    digits
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

// ============================================================================
// Rules
// ============================================================================

/// Read quota, threshold and bucket table from the rules sheet.
pub fn parse_rules(rows: &[Vec<String>]) -> Result<RulesSheet> {
    let quota_cell = cell_at(rows, 1, 2);
    let quota = parse_int(quota_cell, "C2")?;
    let quota = usize::try_from(quota)
        .map_err(|_| Error::InvalidInput(format!("C2: quota must not be negative, got {}", quota)))?;

    let days_cell = cell_at(rows, 2, 2);
    let stale_days = if days_cell.is_empty() {
        None
    } else {
        Some(parse_int(days_cell, "C3")?)
    };

    let mut buckets = BTreeMap::new();
    for (i, row) in rows.iter().enumerate().skip(BUCKET_TABLE_START_ROW - 1) {
        let key = row.get(1).map(|v| v.trim()).unwrap_or_default();
        let days = row.get(2).map(|v| v.trim()).unwrap_or_default();
        if key.is_empty() && days.is_empty() {
            continue;
        }
        let row_number = i + 1;
        let key = parse_int(key, &format!("B{}", row_number))?;
        let days = parse_int(days, &format!("C{}", row_number))?;
        buckets.insert(key, days);
    }

    Ok(RulesSheet {
        quota,
        stale_days,
        buckets,
    })
}

fn cell_at(rows: &[Vec<String>], row: usize, col: usize) -> &str {
    rows.get(row)
        .and_then(|r| r.get(col))
        .map(|v| v.trim())
        .unwrap_or_default()
}

/// Parse an integer cell, accepting whole-number decimals like `30.0`.
fn parse_int(raw: &str, cell: &str) -> Result<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }

    match raw.replace(',', ".").parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        _ => Err(Error::InvalidInput(format!(
            "{}: expected a whole number, got '{}'",
            cell, raw
        ))),
    }
}

// ============================================================================
// Marker write-back
// ============================================================================

/// Quote a sheet title for A1 notation.
pub fn quote_sheet_title(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

/// One update per data row: `1` for selected rows, blank for the rest.
///
/// Covers rows `2..=total_rows + 1` of `column`.
pub fn marker_updates(
    sheet_title: &str,
    column: &str,
    selected: &[Record],
    total_rows: usize,
) -> Vec<ValueRange> {
    let chosen: HashSet<usize> = selected.iter().map(|r| r.row_index).collect();
    let sheet = quote_sheet_title(sheet_title);

    (2..total_rows + 2)
        .map(|row| {
            let value = if chosen.contains(&row) { MARKER_VALUE } else { "" };
            ValueRange {
                range: format!("{}!{}{}", sheet, column, row),
                values: vec![vec![value.to_string()]],
            }
        })
        .collect()
}
