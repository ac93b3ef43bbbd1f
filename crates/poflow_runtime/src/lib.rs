pub mod audit;
pub mod context;
pub mod directory;
pub mod errors;
pub mod ledger;
pub mod orders;
pub mod persistence;
pub mod store;
pub mod workflow;

pub use context::RuntimeContext;
pub use errors::RuntimeError;
pub use ledger::{DeliveryLedger, DeliveryOutcome, DeliveryReceipt};
pub use orders::{OrderEdit, OrderService};
pub use store::{MemoryStore, OrderStore, SqliteStore, StoreError, init_store};
