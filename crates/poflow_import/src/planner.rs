use poflow_model::OrderId;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::normalizer::NormalizedRow;
use crate::resolver::KeyIndex;

/// Totals closer than this are considered unchanged.
pub const VALUE_TOLERANCE: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BatchKey {
    Po(String),
    Requisition(String),
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchKey::Po(po) => write!(f, "PO {}", po),
            BatchKey::Requisition(req) => write!(f, "requisition {}", req),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Requisition-only row whose requisition already belongs to an order with a PO.
    Superseded,
    /// Key already exists and the run skips existing orders.
    Duplicate,
    /// Same key as an earlier row of this batch; its cells were folded into that row.
    Merged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    Insert,
    Update {
        id: OrderId,
        stored_total: Decimal,
        value_will_change: bool,
    },
    Skip { reason: SkipReason, detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedRow {
    pub row: NormalizedRow,
    pub action: PlanAction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub to_insert: usize,
    pub to_update: usize,
    pub to_skip: usize,
    pub value_will_change: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportPlan {
    pub rows: Vec<PlannedRow>,
    pub summary: PlanSummary,
}

pub fn value_differs(stored: Decimal, incoming: Decimal) -> bool {
    (stored - incoming).abs() > VALUE_TOLERANCE
}

/// Key a row is matched on: its PO number, else its requisition number.
fn batch_key(row: &NormalizedRow) -> Option<BatchKey> {
    match (&row.purchase_order_number, &row.requisition_number) {
        (Some(po), _) => Some(BatchKey::Po(po.clone())),
        (None, Some(req)) => Some(BatchKey::Requisition(req.clone())),
        (None, None) => None,
    }
}

/// Folds every row into the first row of the batch with the same key, later
/// cells winning. Folded rows stay in place and carry the line of that first row.
fn fold_repeated_keys(rows: Vec<NormalizedRow>) -> Vec<(NormalizedRow, Option<usize>)> {
    let mut head_of: HashMap<BatchKey, usize> = HashMap::new();
    let mut folded: Vec<(NormalizedRow, Option<usize>)> = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(key) = batch_key(&row) else {
            folded.push((row, None));
            continue;
        };
        match head_of.get(&key) {
            Some(&head) => {
                let (head_row, _) = &mut folded[head];
                head_row.absorb(&row);
                let head_line = head_row.line;
                folded.push((row, Some(head_line)));
            }
            None => {
                head_of.insert(key, folded.len());
                folded.push((row, None));
            }
        }
    }
    folded
}

/// Decides one action per row, in row order. Pure and deterministic.
///
/// Rows repeating a key are folded into the first of them. With
/// `skip_existing` the first row wins and the repeats are skipped as duplicates.
pub fn plan(rows: Vec<NormalizedRow>, index: &KeyIndex, skip_existing: bool) -> ImportPlan {
    let rows = if skip_existing {
        rows.into_iter().map(|row| (row, None)).collect()
    } else {
        fold_repeated_keys(rows)
    };

    let mut first_seen: HashMap<BatchKey, usize> = HashMap::new();
    let mut summary = PlanSummary::default();
    let mut planned = Vec::with_capacity(rows.len());

    for (row, merged_into) in rows {
        let action = match (merged_into, &row.purchase_order_number, &row.requisition_number) {
            (Some(head_line), _, _) => PlanAction::Skip {
                reason: SkipReason::Merged,
                detail: format!("{} merged into line {}", row.key().unwrap_or_default(), head_line),
            },
            (None, Some(po), _) => match index.po_to_id.get(po) {
                Some(_) if skip_existing => PlanAction::Skip {
                    reason: SkipReason::Duplicate,
                    detail: format!("PO {} already exists", po),
                },
                Some(existing) => update(existing.id.clone(), existing.value_total, &row),
                None => new_key(BatchKey::Po(po.clone()), row.line, &mut first_seen),
            },
            (None, None, Some(req)) => {
                if let Some(existing) = index.req_to_id_without_po.get(req) {
                    update(existing.id.clone(), existing.value_total, &row)
                } else if let Some(owner) = index.req_with_po.get(req) {
                    PlanAction::Skip {
                        reason: SkipReason::Superseded,
                        detail: format!(
                            "requisition {} already belongs to PO {}",
                            req,
                            owner.purchase_order_number.as_deref().unwrap_or_default()
                        ),
                    }
                } else {
                    new_key(BatchKey::Requisition(req.clone()), row.line, &mut first_seen)
                }
            }
            (None, None, None) => PlanAction::Insert,
        };

        match &action {
            PlanAction::Insert => summary.to_insert += 1,
            PlanAction::Update { value_will_change, .. } => {
                summary.to_update += 1;
                if *value_will_change {
                    summary.value_will_change += 1;
                }
            }
            PlanAction::Skip { .. } => summary.to_skip += 1,
        }
        planned.push(PlannedRow { row, action });
    }

    ImportPlan {
        rows: planned,
        summary,
    }
}

fn update(id: OrderId, stored_total: Decimal, row: &NormalizedRow) -> PlanAction {
    PlanAction::Update {
        id,
        stored_total,
        value_will_change: row.value_total.is_some_and(|v| value_differs(stored_total, v)),
    }
}

/// Only the first row of a new key inserts; folding leaves repeats here only
/// when existing keys are skipped.
fn new_key(key: BatchKey, line: usize, first_seen: &mut HashMap<BatchKey, usize>) -> PlanAction {
    match first_seen.get(&key) {
        Some(&first_line) => PlanAction::Skip {
            detail: format!("{} repeats line {}", key, first_line),
            reason: SkipReason::Duplicate,
        },
        None => {
            first_seen.insert(key, line);
            PlanAction::Insert
        }
    }
}
