//! Event Scanner - polling loop, finality and resumption

use crate::domain::ScanCursor;
use crate::error::{ScanError, ScanResult};
use crate::ports::CursorStore;
use dx_01_event_decoder::{DecodeError, EventDecoder};
use serde::{Deserialize, Serialize};
use shared_types::{
    Address, BlockNumber, LedgerClient, LedgerError, LedgerEvent, LogFilter, LogPosition,
    RetryPolicy,
};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, info, warn};

/// Scanner configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Blocks required on top of a block before it is scanned.
    pub confirmations: u64,
    /// Delay between polls once caught up.
    pub poll_interval_ms: u64,
    /// Maximum blocks per `get_logs` request.
    pub batch_size: u64,
    /// Items buffered ahead of the consumer.
    pub buffer: usize,
    /// Budget for transient ledger errors.
    pub retry: RetryPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            confirmations: 12,
            poll_interval_ms: 1_000,
            batch_size: 500,
            buffer: 1_024,
            retry: RetryPolicy::default(),
        }
    }
}

/// One item of the scan stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanItem {
    /// A decoded event, in `(block, log_index)` order.
    Event(LedgerEvent),
    /// A log of the contract set that failed to decode. Its position counts
    /// as delivered.
    Undecodable {
        position: LogPosition,
        contract: Address,
        error: DecodeError,
    },
    /// Every block up to and including this one has been delivered.
    Finalized(BlockNumber),
    /// The scan stopped on an unrecoverable error. Always the last item.
    Fatal(ScanError),
}

/// Produces scans over the known contract set.
pub struct EventScanner {
    ledger: Arc<dyn LedgerClient>,
    decoder: EventDecoder,
    store: Arc<dyn CursorStore>,
    config: ScanConfig,
}

impl EventScanner {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        decoder: EventDecoder,
        store: Arc<dyn CursorStore>,
        config: ScanConfig,
    ) -> Self {
        Self {
            ledger,
            decoder,
            store,
            config,
        }
    }

    /// Start scanning. A persisted cursor takes precedence over `from_block`.
    pub fn scan(&self, from_block: BlockNumber) -> ScanResult<(ScanHandle, ScanStream)> {
        let cursor = match self.store.load()? {
            Some(saved) => {
                info!(
                    next_block = saved.next_block,
                    last_delivered = ?saved.last_delivered,
                    "Resuming scan from saved cursor"
                );
                saved
            }
            None => {
                info!(from_block, "Starting scan");
                ScanCursor::starting_at(from_block)
            }
        };

        let (items_tx, items_rx) = mpsc::channel(self.config.buffer.max(1));
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = ScanTask {
            ledger: self.ledger.clone(),
            decoder: self.decoder.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
            items: items_tx,
            stop: stop_rx,
        };
        let join = tokio::spawn(task.run(cursor));

        Ok((
            ScanHandle { stop: stop_tx, join },
            ScanStream {
                inner: ReceiverStream::new(items_rx),
            },
        ))
    }
}

/// Control side of a running scan.
pub struct ScanHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<ScanCursor>,
}

impl ScanHandle {
    /// Halt after the current batch, flush the cursor and return it.
    pub async fn stop(self) -> ScanResult<ScanCursor> {
        let _ = self.stop.send(true);
        self.join().await
    }

    /// Wait for the scan to end on its own (fatal error or dropped stream).
    pub async fn join(self) -> ScanResult<ScanCursor> {
        self.join
            .await
            .map_err(|e| ScanError::TaskFailed(e.to_string()))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Lazy, unbounded sequence of scan items.
pub struct ScanStream {
    inner: ReceiverStream<ScanItem>,
}

impl Stream for ScanStream {
    type Item = ScanItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

enum BatchOutcome {
    /// Blocks remain between the cursor and the safe head.
    MoreAvailable,
    /// Caught up with the safe head.
    CaughtUp,
    /// Consumer went away.
    Closed,
}

struct ScanTask {
    ledger: Arc<dyn LedgerClient>,
    decoder: EventDecoder,
    store: Arc<dyn CursorStore>,
    config: ScanConfig,
    items: mpsc::Sender<ScanItem>,
    stop: watch::Receiver<bool>,
}

impl ScanTask {
    async fn run(mut self, mut cursor: ScanCursor) -> ScanCursor {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if *self.stop.borrow() {
                info!(next_block = cursor.next_block, "Scan stop requested");
                break;
            }

            match self.scan_batch(&mut cursor).await {
                Ok(BatchOutcome::MoreAvailable) => continue,
                Ok(BatchOutcome::CaughtUp) => {}
                Ok(BatchOutcome::Closed) => {
                    debug!("Scan stream dropped, stopping");
                    break;
                }
                Err(e) => {
                    error!(error = %e, next_block = cursor.next_block, "Scan aborted");
                    let _ = self.items.send(ScanItem::Fatal(e)).await;
                    break;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = self.stop.changed() => {
                    // Handle dropped without stopping: keep scanning for the stream.
                    if changed.is_err() {
                        tokio::time::sleep(poll_interval).await;
                    }
                }
            }
        }

        self.persist(&cursor);
        cursor
    }

    async fn scan_batch(&self, cursor: &mut ScanCursor) -> ScanResult<BatchOutcome> {
        let ledger = self.ledger.clone();
        let head = self
            .config
            .retry
            .run(|| ledger.block_number(), LedgerError::is_transient)
            .await
            .map_err(|e| ScanError::ScanUnavailable {
                attempts: e.attempts,
                last_error: e.error.to_string(),
            })?;

        let Some(safe) = head.checked_sub(self.config.confirmations) else {
            return Ok(BatchOutcome::CaughtUp);
        };
        if cursor.next_block > safe {
            return Ok(BatchOutcome::CaughtUp);
        }

        let from = cursor.next_block;
        let to = safe.min(from.saturating_add(self.config.batch_size.max(1) - 1));
        let filter = LogFilter {
            contracts: self.decoder.contracts(),
            topics: self.decoder.topics(),
            from_block: from,
            to_block: to,
        };

        let mut logs = self
            .config
            .retry
            .run(|| ledger.get_logs(&filter), LedgerError::is_transient)
            .await
            .map_err(|e| ScanError::ScanUnavailable {
                attempts: e.attempts,
                last_error: e.error.to_string(),
            })?;
        logs.sort_by_key(|log| log.position());

        let mut delivered = 0usize;
        for log in &logs {
            let position = log.position();
            if log.removed {
                debug!(%position, "Skipping removed log");
                continue;
            }
            if cursor.already_delivered(&position) {
                continue;
            }
            cursor.deliver(position);

            match self.decoder.decode(log) {
                Ok(event) => {
                    if self.items.send(ScanItem::Event(event)).await.is_err() {
                        return Ok(BatchOutcome::Closed);
                    }
                    delivered += 1;
                }
                Err(error) => {
                    warn!(%position, %error, "Undecodable log");
                    let item = ScanItem::Undecodable {
                        position,
                        contract: log.address,
                        error,
                    };
                    if self.items.send(item).await.is_err() {
                        return Ok(BatchOutcome::Closed);
                    }
                }
            }
        }

        cursor.complete_through(to);
        self.persist(cursor);
        debug!(from, to, head, delivered, "Batch scanned");

        if self.items.send(ScanItem::Finalized(to)).await.is_err() {
            return Ok(BatchOutcome::Closed);
        }

        Ok(if to < safe {
            BatchOutcome::MoreAvailable
        } else {
            BatchOutcome::CaughtUp
        })
    }

    fn persist(&self, cursor: &ScanCursor) {
        if let Err(e) = self.store.save(cursor) {
            warn!(error = %e, "Failed to save scan cursor");
        }
    }
}
