use serde::{Deserialize, Serialize};
use std::fmt;

pub mod audit;
pub mod column;
pub mod invariant;
pub mod order;
pub mod party;
pub mod status;

pub use audit::{AuditAction, AuditEntry, DeliveryRecord};
pub use column::Column;
pub use invariant::{Invariant, InvariantViolation};
pub use order::{Order, OrderField, OrderFields, OrderKey};
pub use party::{Department, NewSupplier, Supplier};
pub use status::OrderStatus;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(TenantId);
string_id!(OrderId);
