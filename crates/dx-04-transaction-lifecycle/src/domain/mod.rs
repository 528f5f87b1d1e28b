//! Domain layer for the Transaction Lifecycle

pub mod listing;
pub mod machine;
pub mod registry;

pub use listing::ListingBook;
pub use machine::{Applied, Effect, Stamp, TransactionStateMachine, Transition, Trigger};
pub use registry::{MachineHandle, TransactionRegistry};
