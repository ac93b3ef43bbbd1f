use poflow_model::{InvariantViolation, OrderId};
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A precondition on the request itself failed; nothing was written.
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error(transparent)]
    InvariantViolation(#[from] InvariantViolation),
    #[error("order '{0}' not found")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    DataStoreError(#[from] StoreError),
}
