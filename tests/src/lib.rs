//! # Data Exchange Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # End-to-end lifecycle through ledger logs
//!     ├── harness.rs    # In-process ledger + runtime fixture
//!     ├── scenarios.rs  # Verification, arbitration and handoff flows
//!     └── replay.rs     # Restart, replay and duplicate delivery
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p dx-tests
//! cargo test -p dx-tests integration::replay::
//! ```

pub mod integration;
