use chrono::NaiveDate;
use poflow_model::{Invariant, InvariantViolation, OrderFields, OrderStatus};
use rust_decimal::Decimal;

/// Status machine and order invariants. Every mutation path runs its
/// candidate fields through [`WorkflowEngine::validate`] before writing.
pub struct WorkflowEngine;

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_transition(&self, current: OrderStatus, next: OrderStatus) -> Result<(), InvariantViolation> {
        if current.can_transition_to(next) {
            return Ok(());
        }
        Err(InvariantViolation::new(
            Invariant::StatusTransition,
            format!("invalid transition from '{}' to '{}'", current, next),
        ))
    }

    /// Checks `after` on its own and, when `before` is given, as a successor of
    /// the stored state.
    pub fn validate(&self, before: Option<&OrderFields>, after: &OrderFields) -> Result<(), InvariantViolation> {
        if after.quantity_requested < Decimal::ZERO
            || after.quantity_delivered < Decimal::ZERO
            || after.value_total < Decimal::ZERO
        {
            return Err(InvariantViolation::new(
                Invariant::NonNegativeValues,
                format!(
                    "requested {}, delivered {}, total {}",
                    after.quantity_requested.normalize(),
                    after.quantity_delivered.normalize(),
                    after.value_total.normalize()
                ),
            ));
        }

        if let Some(before) = before {
            if after.quantity_delivered < before.quantity_delivered {
                return Err(InvariantViolation::new(
                    Invariant::DeliveredMonotonic,
                    format!(
                        "delivered quantity would drop from {} to {}",
                        before.quantity_delivered.normalize(),
                        after.quantity_delivered.normalize()
                    ),
                ));
            }
            if after.quantity_requested < before.quantity_delivered {
                return Err(InvariantViolation::new(
                    Invariant::RequestedNotBelowDelivered,
                    format!(
                        "requested quantity {} is below the {} already delivered",
                        after.quantity_requested.normalize(),
                        before.quantity_delivered.normalize()
                    ),
                ));
            }
            self.validate_transition(before.status, after.status)?;
            // An order that once carried a PO keeps one unless it returns to NoPO.
            if before.purchase_order_number.is_some()
                && after.purchase_order_number.is_none()
                && after.status != OrderStatus::NoPo
            {
                return Err(InvariantViolation::new(
                    Invariant::StatusMatchesPoNumber,
                    format!("PO number cannot be removed while status is '{}'", after.status),
                ));
            }
        }

        if after.quantity_delivered > after.quantity_requested {
            return Err(InvariantViolation::new(
                Invariant::DeliveredWithinRequested,
                format!(
                    "delivered {} exceeds requested {}",
                    after.quantity_delivered.normalize(),
                    after.quantity_requested.normalize()
                ),
            ));
        }

        let has_po = after.purchase_order_number.is_some();
        if after.status.forbids_po_number() && has_po {
            return Err(InvariantViolation::new(
                Invariant::StatusMatchesPoNumber,
                format!("status '{}' but PO number is set", after.status),
            ));
        }
        if after.status.requires_po_number() && !has_po {
            return Err(InvariantViolation::new(
                Invariant::StatusMatchesPoNumber,
                format!("status '{}' requires a PO number", after.status),
            ));
        }

        if after.status == OrderStatus::Delivered && after.quantity_pending() > Decimal::ZERO {
            return Err(InvariantViolation::new(
                Invariant::DeliveredHasNothingPending,
                format!("{} still pending", after.quantity_pending().normalize()),
            ));
        }

        Ok(())
    }
}

/// Promotes NoPO to HasPO once a PO number is present.
pub fn align_status_with_po(fields: &mut OrderFields) {
    if fields.status == OrderStatus::NoPo && fields.purchase_order_number.is_some() {
        fields.status = OrderStatus::HasPo;
    }
}

/// Marks the order Delivered when nothing is pending and something was
/// delivered. Returns whether the status changed.
pub fn settle(fields: &mut OrderFields, today: NaiveDate) -> bool {
    if fields.status == OrderStatus::Delivered
        || fields.quantity_delivered <= Decimal::ZERO
        || fields.quantity_pending() > Decimal::ZERO
    {
        return false;
    }
    fields.status = OrderStatus::Delivered;
    if fields.actual_delivery_date.is_none() {
        fields.actual_delivery_date = Some(today);
    }
    true
}

/// Completes the order outright: everything requested counts as delivered.
pub fn close_out(fields: &mut OrderFields, today: NaiveDate) {
    if fields.quantity_delivered < fields.quantity_requested {
        fields.quantity_delivered = fields.quantity_requested;
    }
    fields.status = OrderStatus::Delivered;
    if fields.actual_delivery_date.is_none() {
        fields.actual_delivery_date = Some(today);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fields(requested: Decimal, delivered: Decimal, status: OrderStatus, po: Option<&str>) -> OrderFields {
        OrderFields {
            description: "Parafuso M8".to_string(),
            quantity_requested: requested,
            quantity_delivered: delivered,
            status,
            purchase_order_number: po.map(str::to_string),
            ..Default::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap_or_default()
    }

    #[test]
    fn settle_sets_delivered_and_date_once() {
        let mut f = fields(dec!(10), dec!(10), OrderStatus::InTransit, Some("OC-1"));
        assert!(settle(&mut f, today()));
        assert_eq!(f.status, OrderStatus::Delivered);
        assert_eq!(f.actual_delivery_date, Some(today()));

        let earlier = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        let mut g = fields(dec!(5), dec!(5), OrderStatus::HasPo, Some("OC-2"));
        g.actual_delivery_date = Some(earlier);
        settle(&mut g, today());
        assert_eq!(g.actual_delivery_date, Some(earlier));
    }

    #[test]
    fn settle_ignores_untouched_orders() {
        let mut f = fields(dec!(0), dec!(0), OrderStatus::NoPo, None);
        assert!(!settle(&mut f, today()));
        assert_eq!(f.status, OrderStatus::NoPo);
    }

    #[test]
    fn close_out_fills_delivered() {
        let mut f = fields(dec!(8), dec!(3), OrderStatus::HasPo, Some("OC-3"));
        close_out(&mut f, today());
        assert_eq!(f.quantity_delivered, dec!(8));
        assert_eq!(f.quantity_pending(), dec!(0));
        assert!(WorkflowEngine::new().validate(None, &f).is_ok());
    }

    #[test]
    fn po_number_stays_on_delivered_order() {
        let before = fields(dec!(10), dec!(10), OrderStatus::Delivered, Some("OC-5"));
        let after = fields(dec!(10), dec!(10), OrderStatus::Delivered, None);
        let err = WorkflowEngine::new().validate(Some(&before), &after).unwrap_err();
        assert_eq!(err.invariant, Invariant::StatusMatchesPoNumber);

        // Without history, Delivered alone does not demand a PO.
        assert!(WorkflowEngine::new().validate(None, &after).is_ok());
    }

    #[test]
    fn align_promotes_no_po() {
        let mut f = fields(dec!(1), dec!(0), OrderStatus::NoPo, Some("OC-4"));
        align_status_with_po(&mut f);
        assert_eq!(f.status, OrderStatus::HasPo);
    }
}
