//! Domain module for Key Handoff

pub mod ciphertext;
pub mod record;

pub use ciphertext::Ciphertext;
pub use record::{HandoffRecord, HandoffStatus};
