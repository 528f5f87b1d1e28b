//! # Adapters Layer
//!
//! Schema providers.

mod static_schemas;

pub use static_schemas::{marketplace_schema, StaticSchemaProvider};
