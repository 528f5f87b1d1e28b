//! Domain module for Event Scanner

pub mod cursor;

pub use cursor::ScanCursor;
