//! # Scan Pipeline
//!
//! Consumes the scan stream: each event is typed and dispatched to the
//! router, each finalized block advances the engine's clock, and a fatal
//! scan error ends the pipeline.
//!
//! ```text
//! ScanStream ──Event──→ MarketEvent ──→ EventRouter::dispatch (never waits)
//!            ──Undecodable──→ DecodeFailure anomaly
//!            ──Finalized(b)──→ wait for lanes ──→ engine.on_block(b) ──→ snapshot
//!            ──Fatal(e)──→ exit
//! ```

use std::sync::Arc;

use dx_01_event_decoder::MarketEvent;
use dx_02_event_scanner::{ScanError, ScanItem};
use dx_03_event_router::{EventRouter, RoutedEvent};
use dx_04_transaction_lifecycle::LifecycleEngine;
use shared_bus::{AnomalyKind, Notification, NotificationSink};
use shared_types::{BlockNumber, LedgerEvent};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::persistence::DataDir;

/// Why the pipeline stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    /// The stream ended (scan stopped).
    Drained { events: u64, last_block: Option<BlockNumber> },
    /// The scanner gave up.
    Fatal(ScanError),
}

pub struct Pipeline {
    router: EventRouter,
    engine: Arc<LifecycleEngine>,
    sink: Arc<dyn NotificationSink>,
    data: Option<Arc<DataDir>>,
    snapshot_interval: u64,
}

impl Pipeline {
    pub fn new(
        router: EventRouter,
        engine: Arc<LifecycleEngine>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            router,
            engine,
            sink,
            data: None,
            snapshot_interval: 0,
        }
    }

    /// Save a lifecycle snapshot every `interval` finalized blocks.
    pub fn with_snapshots(mut self, data: Arc<DataDir>, interval: u64) -> Self {
        self.data = Some(data);
        self.snapshot_interval = interval;
        self
    }

    pub async fn run<S>(self, mut stream: S) -> PipelineExit
    where
        S: Stream<Item = ScanItem> + Unpin,
    {
        let mut events = 0u64;
        let mut last_block = None;
        let mut last_snapshot = self.engine.current_block();

        while let Some(item) = stream.next().await {
            match item {
                ScanItem::Event(event) => {
                    events += 1;
                    self.dispatch(event).await;
                }
                ScanItem::Undecodable {
                    position,
                    contract,
                    error,
                } => {
                    let event = error
                        .event_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("log of {contract}"));
                    self.sink
                        .notify(Notification::anomaly(
                            None,
                            Some(position.block_number),
                            AnomalyKind::DecodeFailure,
                            event,
                            format!("{position}: {error}"),
                        ))
                        .await;
                }
                ScanItem::Finalized(block) => {
                    // Vote deadlines must see every vote of the block.
                    self.router.wait_idle().await;
                    self.engine.on_block(block).await;
                    last_block = Some(block);

                    if self.snapshot_interval > 0
                        && block >= last_snapshot.saturating_add(self.snapshot_interval)
                    {
                        self.save_snapshot().await;
                        last_snapshot = block;
                    }
                }
                ScanItem::Fatal(e) => {
                    error!(error = %e, events, "Scan failed, pipeline stopping");
                    return PipelineExit::Fatal(e);
                }
            }
        }

        info!(events, ?last_block, "Scan stream ended");
        PipelineExit::Drained { events, last_block }
    }

    async fn dispatch(&self, event: LedgerEvent) {
        let position = event.position();
        match MarketEvent::try_from(&event) {
            Ok(market) => {
                debug!(event = %market.name(), %position, "Dispatching event");
                self.router.dispatch(RoutedEvent::new(event, market));
            }
            Err(e) => {
                warn!(event = %event.name, %position, error = %e, "Event could not be typed");
                self.sink
                    .notify(Notification::anomaly(
                        None,
                        Some(position.block_number),
                        AnomalyKind::DecodeFailure,
                        event.name.clone(),
                        e.to_string(),
                    ))
                    .await;
            }
        }
    }

    async fn save_snapshot(&self) {
        let Some(data) = &self.data else {
            return;
        };
        let snapshot = self.engine.snapshot().await;
        if let Err(e) = data.save_snapshot(&snapshot) {
            warn!(error = %e, "Periodic lifecycle snapshot failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dx_02_event_scanner::InMemoryLedger;
    use dx_04_transaction_lifecycle::{EngineConfig, InMemoryContentStore};
    use dx_06_key_handoff::{DevKeyService, HandoffConfig, HandoffManager};
    use dx_07_action_submitter::{ActionSubmitter, DevSigner, SubmitterConfig};
    use dx_01_event_decoder::DecodeError;
    use shared_bus::{
        InMemoryNotificationBus, NotificationFilter, NotificationKind, NotificationPayload,
    };
    use shared_types::{Address, FieldMap, FieldValue, LogPosition};

    fn pipeline() -> (Pipeline, Arc<InMemoryNotificationBus>, Arc<LifecycleEngine>) {
        let router = EventRouter::new();
        let bus = Arc::new(InMemoryNotificationBus::new());
        let engine = LifecycleEngine::new(
            EngineConfig {
                reconcile_interval_blocks: 0,
                ..EngineConfig::default()
            },
            router.clone(),
            Arc::new(ActionSubmitter::new(
                Arc::new(InMemoryLedger::new()),
                Arc::new(DevSigner::new()),
                SubmitterConfig::default(),
            )),
            Arc::new(HandoffManager::new(
                Arc::new(DevKeyService::new()),
                HandoffConfig::default(),
            )),
            Arc::new(InMemoryContentStore::new()),
            bus.clone(),
        );
        (Pipeline::new(router, engine.clone(), bus.clone()), bus, engine)
    }

    fn ledger_event(name: &str, fields: FieldMap) -> LedgerEvent {
        LedgerEvent {
            contract: Address([0x11; 20]),
            name: name.to_string(),
            block_number: 5,
            log_index: 0,
            fields,
        }
    }

    #[tokio::test]
    async fn test_finalized_advances_engine_clock() {
        let (pipeline, _bus, engine) = pipeline();
        let items = tokio_stream::iter(vec![ScanItem::Finalized(7), ScanItem::Finalized(9)]);

        let exit = pipeline.run(items).await;

        assert_eq!(
            exit,
            PipelineExit::Drained {
                events: 0,
                last_block: Some(9)
            }
        );
        assert_eq!(engine.current_block(), 9);
    }

    #[tokio::test]
    async fn test_untypable_event_is_reported() {
        let (pipeline, bus, _engine) = pipeline();
        let mut fields = FieldMap::new();
        fields.push("verifier", FieldValue::Bool(true));
        let items = tokio_stream::iter(vec![ScanItem::Event(ledger_event(
            "RegisterVerifier",
            fields,
        ))]);

        pipeline.run(items).await;

        let anomalies = bus.recent(&NotificationFilter::kinds(vec![NotificationKind::Anomaly]));
        assert_eq!(anomalies.len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_log_is_reported_with_its_block() {
        let (pipeline, bus, _engine) = pipeline();
        let items = tokio_stream::iter(vec![
            ScanItem::Undecodable {
                position: LogPosition::new(4, 2),
                contract: Address([0x11; 20]),
                error: DecodeError::MissingTopic,
            },
            ScanItem::Undecodable {
                position: LogPosition::new(6, 0),
                contract: Address([0x11; 20]),
                error: DecodeError::FieldCountMismatch {
                    event: "Vote".to_string(),
                    expected: 5,
                    actual: 1,
                },
            },
        ]);

        pipeline.run(items).await;

        let anomalies = bus.recent(&NotificationFilter::kinds(vec![NotificationKind::Anomaly]));
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].block_number, Some(4));
        assert_eq!(anomalies[1].block_number, Some(6));
        match &anomalies[1].payload {
            NotificationPayload::Anomaly { anomaly, event, .. } => {
                assert_eq!(*anomaly, AnomalyKind::DecodeFailure);
                assert_eq!(event, "Vote");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fatal_item_stops_pipeline() {
        let (pipeline, _bus, _engine) = pipeline();
        let fatal = ScanError::ScanUnavailable {
            attempts: 3,
            last_error: "connection refused".into(),
        };
        let items = tokio_stream::iter(vec![
            ScanItem::Fatal(fatal.clone()),
            ScanItem::Finalized(3),
        ]);

        assert_eq!(pipeline.run(items).await, PipelineExit::Fatal(fatal));
    }
}
