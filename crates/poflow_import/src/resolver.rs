use poflow_model::{OrderKey, TenantId};
use poflow_runtime::{OrderStore, StoreError};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::normalizer::NormalizedRow;

/// Stored orders the batch's keys point at, fetched once per batch.
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    pub po_to_id: HashMap<String, OrderKey>,
    /// Requisitions whose stored order has no PO yet; rows may update them.
    pub req_to_id_without_po: HashMap<String, OrderKey>,
    /// Requisitions already attached to an order with a PO; rows are skipped.
    pub req_with_po: HashMap<String, OrderKey>,
}

impl KeyIndex {
    pub fn from_keys(by_po: Vec<OrderKey>, by_requisition: Vec<OrderKey>) -> Self {
        let mut index = KeyIndex::default();
        for key in by_po {
            if let Some(po) = key.purchase_order_number.clone() {
                index.po_to_id.entry(po).or_insert(key);
            }
        }
        for key in by_requisition {
            let Some(req) = key.requisition_number.clone() else { continue };
            let target = if key.purchase_order_number.is_some() {
                &mut index.req_with_po
            } else {
                &mut index.req_to_id_without_po
            };
            target.entry(req).or_insert(key);
        }
        index
    }
}

/// Distinct PO numbers, and distinct requisitions of rows without a PO.
pub fn batch_keys(rows: &[NormalizedRow]) -> (Vec<String>, Vec<String>) {
    let mut pos = BTreeSet::new();
    let mut reqs = BTreeSet::new();
    for row in rows {
        match (&row.purchase_order_number, &row.requisition_number) {
            (Some(po), _) => {
                pos.insert(po.clone());
            }
            (None, Some(req)) => {
                reqs.insert(req.clone());
            }
            (None, None) => {}
        }
    }
    (pos.into_iter().collect(), reqs.into_iter().collect())
}

/// At most two store queries, one per key kind, skipped when the batch has
/// no key of that kind.
pub async fn resolve_keys(
    store: &dyn OrderStore,
    tenant: &TenantId,
    rows: &[NormalizedRow],
) -> Result<KeyIndex, StoreError> {
    let (pos, reqs) = batch_keys(rows);

    let by_po = if pos.is_empty() {
        Vec::new()
    } else {
        store.orders_by_po_numbers(tenant, &pos).await?
    };
    let by_requisition = if reqs.is_empty() {
        Vec::new()
    } else {
        store.orders_by_requisition_numbers(tenant, &reqs).await?
    };

    let index = KeyIndex::from_keys(by_po, by_requisition);
    debug!(
        tenant = %tenant,
        po_keys = pos.len(),
        requisition_keys = reqs.len(),
        po_matches = index.po_to_id.len(),
        requisition_matches = index.req_to_id_without_po.len(),
        superseded = index.req_with_po.len(),
        "batch keys resolved"
    );
    Ok(index)
}
