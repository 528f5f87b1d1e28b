//! # Exchange Runtime
//!
//! ## Startup Sequence
//!
//! 1. Lock the data directory
//! 2. Restore the lifecycle snapshot, rewinding the scan cursor to it
//! 3. Start the scanner and the pipeline task
//!
//! ## Shutdown Sequence
//!
//! 1. Stop the scanner after its current batch and flush its cursor
//! 2. Drain the pipeline and the router lanes
//! 3. Persist the lifecycle snapshot

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use dx_02_event_scanner::{ScanCursor, ScanError, ScanHandle};
use dx_03_event_router::EventRouter;
use dx_04_transaction_lifecycle::{LifecycleApi, LifecycleEngine};
use shared_bus::InMemoryNotificationBus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::{NodeConfig, RuntimePorts, SubsystemContainer};
use crate::persistence::DataDir;
use crate::pipeline::{Pipeline, PipelineExit};

struct Running {
    scan: ScanHandle,
    pipeline: JoinHandle<PipelineExit>,
}

/// What `shutdown` left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub cursor: Option<ScanCursor>,
    pub exit: Option<PipelineExit>,
    pub active_transactions: usize,
}

/// The data exchange node: subsystems, scan pipeline and persistence.
pub struct ExchangeRuntime {
    container: SubsystemContainer,
    data: Arc<DataDir>,
    running: parking_lot::Mutex<Option<Running>>,
    fatal_tx: watch::Sender<Option<ScanError>>,
    fatal_rx: watch::Receiver<Option<ScanError>>,
}

impl ExchangeRuntime {
    pub fn new(config: NodeConfig, ports: RuntimePorts) -> Result<Self> {
        config.validate().context("Invalid node configuration")?;
        let data = Arc::new(DataDir::open(&config.storage.data_dir)?);
        let container = SubsystemContainer::new(config, ports, Arc::new(data.cursor_store()));
        let (fatal_tx, fatal_rx) = watch::channel(None);
        Ok(Self {
            container,
            data,
            running: parking_lot::Mutex::new(None),
            fatal_tx,
            fatal_rx,
        })
    }

    pub async fn start(&self) -> Result<()> {
        if self.running.lock().is_some() {
            return Err(anyhow!("Runtime already started"));
        }
        let config = &self.container.config;
        info!("===========================================");
        info!("  Data Exchange Node v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let snapshot = self.data.load_snapshot()?;
        let snapshot_block = snapshot.as_ref().map(|s| s.block);
        if let Some(snapshot) = snapshot {
            self.container
                .engine
                .restore(snapshot)
                .await
                .context("Failed to restore lifecycle snapshot")?;
        }
        self.data
            .rewind_cursor(snapshot_block, config.scanner.start_block)?;

        let (scan, stream) = self
            .container
            .scanner
            .scan(config.scanner.start_block)
            .context("Failed to start the event scanner")?;

        let pipeline = Pipeline::new(
            self.container.router.clone(),
            self.container.engine.clone(),
            self.container.notifications.clone(),
        )
        .with_snapshots(self.data.clone(), config.storage.snapshot_interval_blocks);
        let fatal_tx = self.fatal_tx.clone();
        let pipeline = tokio::spawn(async move {
            let exit = pipeline.run(stream).await;
            if let PipelineExit::Fatal(e) = &exit {
                let _ = fatal_tx.send(Some(e.clone()));
            }
            exit
        });

        *self.running.lock() = Some(Running { scan, pipeline });
        info!(
            data_dir = %self.data.root().display(),
            active = self.container.engine.active_count(),
            "Node running"
        );
        Ok(())
    }

    /// Resolves with the scanner's error once the scan has failed for good.
    pub async fn fatal_error(&self) -> ScanError {
        let mut rx = self.fatal_rx.clone();
        loop {
            if let Some(e) = rx.borrow_and_update().clone() {
                return e;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub async fn shutdown(&self) -> Result<ShutdownReport> {
        info!("Initiating graceful shutdown...");
        let running = self.running.lock().take();

        let (cursor, exit) = match running {
            Some(Running { scan, pipeline }) => {
                let cursor = match scan.stop().await {
                    Ok(cursor) => Some(cursor),
                    Err(e) => {
                        warn!(error = %e, "Scanner did not stop cleanly");
                        None
                    }
                };
                let exit = match pipeline.await {
                    Ok(exit) => Some(exit),
                    Err(e) => {
                        error!(error = %e, "Pipeline task aborted");
                        None
                    }
                };
                (cursor, exit)
            }
            None => (None, None),
        };

        self.container.router.wait_idle().await;
        let snapshot = self.container.engine.snapshot().await;
        let active_transactions = snapshot.active.len();
        self.data
            .save_snapshot(&snapshot)
            .context("Failed to persist lifecycle snapshot")?;
        self.container.router.shutdown();

        info!(
            next_block = cursor.map(|c| c.next_block),
            active_transactions, "Shutdown complete"
        );
        Ok(ShutdownReport {
            cursor,
            exit,
            active_transactions,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.container.config
    }

    /// User actions and state queries.
    pub fn api(&self) -> Arc<dyn LifecycleApi> {
        self.container.engine.clone()
    }

    pub fn engine(&self) -> &Arc<LifecycleEngine> {
        &self.container.engine
    }

    pub fn router(&self) -> &EventRouter {
        &self.container.router
    }

    pub fn notifications(&self) -> &Arc<InMemoryNotificationBus> {
        &self.container.notifications
    }
}
