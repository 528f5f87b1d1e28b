//! # Adapters Layer
//!
//! In-process implementations of the outbound ports.

mod memory_content;

pub use memory_content::InMemoryContentStore;
