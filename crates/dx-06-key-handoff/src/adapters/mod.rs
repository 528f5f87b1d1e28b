//! # Adapters Layer
//!
//! In-process implementations of the outbound ports.

mod dev_key_service;

pub use dev_key_service::DevKeyService;
