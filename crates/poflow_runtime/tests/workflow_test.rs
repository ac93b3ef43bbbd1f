use poflow_model::{Invariant, OrderFields, OrderStatus};
use poflow_runtime::workflow::WorkflowEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn order(requested: Decimal, delivered: Decimal, status: OrderStatus, po: Option<&str>) -> OrderFields {
    OrderFields {
        description: "Rolamento 6205".to_string(),
        quantity_requested: requested,
        quantity_delivered: delivered,
        status,
        purchase_order_number: po.map(str::to_string),
        value_total: dec!(100),
        ..Default::default()
    }
}

#[test]
fn test_status_edges() {
    use OrderStatus::*;
    let engine = WorkflowEngine::new();

    for (from, to) in [
        (NoPo, HasPo),
        (HasPo, InTransit),
        (InTransit, Delivered),
        (NoPo, Delivered),
        (HasPo, Delivered),
        (InTransit, InTransit),
    ] {
        assert!(engine.validate_transition(from, to).is_ok(), "{} -> {}", from, to);
    }

    for (from, to) in [(Delivered, InTransit), (Delivered, NoPo), (InTransit, HasPo), (NoPo, InTransit)] {
        let err = engine.validate_transition(from, to).unwrap_err();
        assert_eq!(err.invariant, Invariant::StatusTransition, "{} -> {}", from, to);
    }
}

#[test]
fn test_delivered_within_requested() {
    let engine = WorkflowEngine::new();
    let err = engine
        .validate(None, &order(dec!(5), dec!(6), OrderStatus::HasPo, Some("OC-1")))
        .unwrap_err();
    assert_eq!(err.invariant, Invariant::DeliveredWithinRequested);
}

#[test]
fn test_requested_not_reduced_below_delivered() {
    let engine = WorkflowEngine::new();
    let before = order(dec!(10), dec!(10), OrderStatus::Delivered, Some("OC-1"));
    let mut after = before.clone();
    after.quantity_requested = dec!(5);
    let err = engine.validate(Some(&before), &after).unwrap_err();
    assert_eq!(err.invariant, Invariant::RequestedNotBelowDelivered);
}

#[test]
fn test_delivered_never_decreases() {
    let engine = WorkflowEngine::new();
    let before = order(dec!(10), dec!(4), OrderStatus::InTransit, Some("OC-1"));
    let mut after = before.clone();
    after.quantity_delivered = dec!(3);
    let err = engine.validate(Some(&before), &after).unwrap_err();
    assert_eq!(err.invariant, Invariant::DeliveredMonotonic);
}

#[test]
fn test_status_matches_po_number() {
    let engine = WorkflowEngine::new();

    let err = engine
        .validate(None, &order(dec!(1), dec!(0), OrderStatus::HasPo, None))
        .unwrap_err();
    assert_eq!(err.invariant, Invariant::StatusMatchesPoNumber);

    let err = engine
        .validate(None, &order(dec!(1), dec!(0), OrderStatus::NoPo, Some("OC-7")))
        .unwrap_err();
    assert_eq!(err.invariant, Invariant::StatusMatchesPoNumber);

    assert!(engine.validate(None, &order(dec!(1), dec!(0), OrderStatus::NoPo, None)).is_ok());
    assert!(engine.validate(None, &order(dec!(1), dec!(1), OrderStatus::Delivered, None)).is_ok());
}

#[test]
fn test_delivered_has_nothing_pending() {
    let engine = WorkflowEngine::new();
    let err = engine
        .validate(None, &order(dec!(10), dec!(2), OrderStatus::Delivered, Some("OC-1")))
        .unwrap_err();
    assert_eq!(err.invariant, Invariant::DeliveredHasNothingPending);
    assert!(err.to_string().contains("8 still pending"));
}

#[test]
fn test_negative_total_rejected() {
    let engine = WorkflowEngine::new();
    let mut f = order(dec!(1), dec!(0), OrderStatus::NoPo, None);
    f.value_total = dec!(-0.01);
    assert_eq!(engine.validate(None, &f).unwrap_err().invariant, Invariant::NonNegativeValues);
}
