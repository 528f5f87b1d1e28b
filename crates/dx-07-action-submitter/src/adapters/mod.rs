//! # Adapters Layer
//!
//! Development signer.

mod dev_signer;

pub use dev_signer::DevSigner;
