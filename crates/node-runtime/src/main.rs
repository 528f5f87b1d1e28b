//! # Data Exchange Node
//!
//! Follows the marketplace contracts, drives every purchase through its
//! lifecycle and submits the node's own actions back to the ledger.
//!
//! ## Flow
//!
//! ```text
//! Ledger ──logs──→ Scanner(2) ──decode(1)──→ Router(3) ──→ Lifecycle(4)
//!                                                            │   │   │
//!                                        Verifiers(5) ←──────┘   │   └──→ Submitter(7) ──→ Ledger
//!                                                                ↓
//!                                                          Key Handoff(6)
//! ```
//!
//! ## Environment
//!
//! - `DX_CONFIG` - JSON configuration file
//! - `DX_RPC_URL`, `DX_PROTOCOL_CONTRACT`, `DX_TOKEN_CONTRACT`, `DX_FROM_BLOCK`,
//!   `DX_CONFIRMATIONS`, `DX_DATA_DIR` - overrides
//! - `DX_DEV_LEDGER=1` - run against an in-process ledger
//! - `RUST_LOG` - log filter (default `info`)

use std::sync::Arc;

use anyhow::{bail, Result};
use dx_02_event_scanner::InMemoryLedger;
use node_runtime::{load_config, ExchangeRuntime, RuntimePorts};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = load_config()?;

    if std::env::var("DX_DEV_LEDGER").as_deref() != Ok("1") {
        error!(
            rpc_url = %config.ledger.rpc_url,
            "No ledger transport is linked into this build; set DX_DEV_LEDGER=1 for the in-process ledger"
        );
        bail!("no ledger transport available");
    }

    let ledger = Arc::new(InMemoryLedger::new());
    let runtime = ExchangeRuntime::new(config, RuntimePorts::in_process(ledger))?;
    runtime.start().await?;

    info!("Node is running. Press Ctrl+C to stop.");
    let failed = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            false
        }
        e = runtime.fatal_error() => {
            error!(error = %e, "Event scan failed permanently");
            true
        }
    };

    runtime.shutdown().await?;
    if failed {
        bail!("node stopped after a fatal scan error");
    }
    Ok(())
}
