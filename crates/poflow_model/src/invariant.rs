use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Order rules every mutation path must preserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Invariant {
    /// quantity_delivered <= quantity_requested
    DeliveredWithinRequested,
    /// quantity_requested never drops below what was already delivered
    RequestedNotBelowDelivered,
    /// quantity_delivered never decreases
    DeliveredMonotonic,
    /// NoPO has no PO number; HasPO and later have one
    StatusMatchesPoNumber,
    /// Delivered means nothing pending
    DeliveredHasNothingPending,
    /// a requisition owned by an order with a PO is not overwritten
    SupersededRequisition,
    /// only the explicit status edges are allowed
    StatusTransition,
    /// quantities and totals are never negative
    NonNegativeValues,
}

impl Invariant {
    pub fn describe(&self) -> &'static str {
        match self {
            Invariant::DeliveredWithinRequested => "delivered quantity may not exceed requested quantity",
            Invariant::RequestedNotBelowDelivered => {
                "requested quantity may not be reduced below the quantity already delivered"
            }
            Invariant::DeliveredMonotonic => "delivered quantity may never decrease",
            Invariant::StatusMatchesPoNumber => {
                "status 'NoPO' requires an empty PO number and any later status requires one"
            }
            Invariant::DeliveredHasNothingPending => "status 'Delivered' requires zero pending quantity",
            Invariant::SupersededRequisition => {
                "requisition already belongs to an order with a PO number and may not be overwritten"
            }
            Invariant::StatusTransition => "status transition not allowed",
            Invariant::NonNegativeValues => "quantities and totals may not be negative",
        }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("invariant violated ({invariant}): {message}")]
pub struct InvariantViolation {
    pub invariant: Invariant,
    pub message: String,
}

impl InvariantViolation {
    pub fn new(invariant: Invariant, message: impl Into<String>) -> Self {
        Self {
            invariant,
            message: message.into(),
        }
    }
}
