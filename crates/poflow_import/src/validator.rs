use poflow_model::Column;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::normalizer::NormalizedRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

impl RowError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Every structural error in a batch, in line order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub rows_checked: usize,
    pub errors: Vec<RowError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn invalid_lines(&self) -> Vec<usize> {
        let mut lines: Vec<usize> = self.errors.iter().map(|e| e.line).collect();
        lines.dedup();
        lines
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s) in {} of {} row(s)",
            self.errors.len(),
            self.invalid_lines().len(),
            self.rows_checked
        )
    }
}

/// Structural checks on one row. Department is free text and never checked.
pub fn validate_row(row: &NormalizedRow) -> Vec<RowError> {
    let mut errors = Vec::new();
    let line = row.line;

    if row.description.is_none() {
        errors.push(RowError::new(line, format!("{} is required", Column::Description)));
    }

    if row.unparsed.contains(&Column::QuantityRequested) {
        errors.push(RowError::new(
            line,
            format!("invalid number in column {}", Column::QuantityRequested),
        ));
    } else if !row.quantity_requested.is_some_and(|q| q > Decimal::ZERO) {
        errors.push(RowError::new(
            line,
            format!("{} must be greater than 0", Column::QuantityRequested),
        ));
    }

    if row.unparsed.contains(&Column::Status) {
        errors.push(RowError::new(
            line,
            format!(
                "invalid status '{}' (expected NoPO, HasPO, InTransit or Delivered)",
                row.status_text.as_deref().unwrap_or_default()
            ),
        ));
    }

    for column in [Column::RequestedDate, Column::PoDate, Column::ExpectedDeliveryDate] {
        if row.unparsed.contains(&column) {
            errors.push(RowError::new(line, format!("invalid date in column {}", column)));
        }
    }

    for (column, value) in [
        (Column::UnitPrice, row.unit_price),
        (Column::LastPurchasePrice, row.last_purchase_price),
        (Column::ValueTotal, row.value_total),
    ] {
        if row.unparsed.contains(&column) {
            errors.push(RowError::new(line, format!("invalid number in column {}", column)));
        } else if value.is_some_and(|v| v < Decimal::ZERO) {
            errors.push(RowError::new(line, format!("negative value in column {}", column)));
        }
    }

    if row.unparsed.contains(&Column::SupplierCode) {
        errors.push(RowError::new(
            line,
            format!(
                "supplier code '{}' is not an integer",
                row.supplier_code_text.as_deref().unwrap_or_default()
            ),
        ));
    }

    errors
}

/// Checks the whole batch without stopping at the first bad row.
pub fn validate_batch(rows: &[NormalizedRow]) -> ValidationReport {
    let mut errors: Vec<RowError> = rows.iter().flat_map(validate_row).collect();
    errors.sort_by_key(|e| e.line);
    ValidationReport {
        rows_checked: rows.len(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;
    use crate::source::RawRow;

    fn messages(raw: RawRow) -> Vec<String> {
        validate_row(&normalize(&raw)).into_iter().map(|e| e.message).collect()
    }

    #[test]
    fn valid_row_has_no_errors() {
        let raw = RawRow::new(2)
            .text(Column::Description, "Luva nitrilica")
            .text(Column::QuantityRequested, "10")
            .text(Column::Department, "Qualquer Coisa Nova");
        assert!(messages(raw).is_empty());
    }

    #[test]
    fn description_and_quantity_required() {
        let msgs = messages(RawRow::new(3).text(Column::QuantityRequested, "0"));
        assert_eq!(
            msgs,
            vec!["descricao is required", "qtde_solicitada must be greater than 0"]
        );
    }

    #[test]
    fn bad_cells_are_named() {
        let raw = RawRow::new(4)
            .text(Column::Description, "Chave")
            .text(Column::QuantityRequested, "2")
            .text(Column::PoDate, "ontem")
            .text(Column::ValueTotal, "-5")
            .text(Column::UnitPrice, "dez")
            .text(Column::SupplierCode, "12.5")
            .text(Column::Status, "Perdido");
        let msgs = messages(raw);
        assert!(msgs.contains(&"invalid date in column data_oc".to_string()));
        assert!(msgs.contains(&"negative value in column valor_total".to_string()));
        assert!(msgs.contains(&"invalid number in column valor_unitario".to_string()));
        assert!(msgs.contains(&"supplier code '12.5' is not an integer".to_string()));
        assert!(msgs.iter().any(|m| m.starts_with("invalid status 'Perdido'")));
    }

    #[test]
    fn batch_report_collects_all_lines() {
        let rows = vec![
            normalize(&RawRow::new(2).text(Column::Description, "A").text(Column::QuantityRequested, "1")),
            normalize(&RawRow::new(3)),
            normalize(&RawRow::new(4).text(Column::Description, "C").text(Column::QuantityRequested, "x")),
        ];
        let report = validate_batch(&rows);
        assert!(!report.is_valid());
        assert_eq!(report.invalid_lines(), vec![3, 4]);
        assert_eq!(report.rows_checked, 3);
        assert_eq!(report.to_string(), "3 error(s) in 2 of 3 row(s)");
    }
}
