//! # Subsystem Container
//!
//! Holds every subsystem instance, wired in dependency order:
//!
//! ```text
//! Level 0: Notification bus, Event router (no dependencies)
//! Level 1: Action submitter, Key handoff (ledger, signer, key service)
//! Level 2: Lifecycle engine (router, submitter, handoff, content, bus)
//! Level 3: Event scanner (ledger, decoder, cursor store)
//! ```

use std::sync::Arc;

use dx_01_event_decoder::{EventDecoder, StaticSchemaProvider};
use dx_02_event_scanner::{CursorStore, EventScanner, InMemoryLedger};
use dx_03_event_router::EventRouter;
use dx_04_transaction_lifecycle::{ContentStore, InMemoryContentStore, LifecycleEngine};
use dx_06_key_handoff::{DevKeyService, HandoffConfig, HandoffManager, KeyService};
use dx_07_action_submitter::{ActionSubmitter, DevSigner, Signer, SubmitterConfig};
use shared_bus::InMemoryNotificationBus;
use shared_types::LedgerClient;
use tracing::info;

use crate::container::config::NodeConfig;

/// External collaborators the node is embedded with.
#[derive(Clone)]
pub struct RuntimePorts {
    pub ledger: Arc<dyn LedgerClient>,
    pub signer: Arc<dyn Signer>,
    pub key_service: Arc<dyn KeyService>,
    pub content: Arc<dyn ContentStore>,
}

impl RuntimePorts {
    /// In-process development adapters around `ledger`.
    pub fn in_process(ledger: Arc<InMemoryLedger>) -> Self {
        Self {
            ledger,
            signer: Arc::new(DevSigner::new()),
            key_service: Arc::new(DevKeyService::new()),
            content: Arc::new(InMemoryContentStore::new()),
        }
    }
}

/// Central container holding all subsystem instances.
pub struct SubsystemContainer {
    pub config: NodeConfig,
    pub notifications: Arc<InMemoryNotificationBus>,
    pub router: EventRouter,
    pub submitter: Arc<ActionSubmitter>,
    pub handoff: Arc<HandoffManager>,
    pub engine: Arc<LifecycleEngine>,
    pub scanner: EventScanner,
}

impl SubsystemContainer {
    pub fn new(config: NodeConfig, ports: RuntimePorts, cursors: Arc<dyn CursorStore>) -> Self {
        let notifications = Arc::new(InMemoryNotificationBus::new());
        let router = EventRouter::new();

        let submitter = Arc::new(ActionSubmitter::new(
            Arc::clone(&ports.ledger),
            ports.signer,
            SubmitterConfig {
                retry: config.submitter.retry,
            },
        ));
        let handoff = Arc::new(HandoffManager::new(
            ports.key_service,
            HandoffConfig {
                retry: config.handoff.retry,
            },
        ));

        let engine = LifecycleEngine::new(
            config.engine_config(),
            router.clone(),
            submitter.clone(),
            handoff.clone(),
            ports.content,
            notifications.clone(),
        );

        let decoder = EventDecoder::new(Arc::new(StaticSchemaProvider::marketplace(
            config.ledger.protocol_contract,
            config.ledger.token_contract,
        )));
        let scanner = EventScanner::new(ports.ledger, decoder, cursors, config.scan_config());

        info!(
            contracts = ?config.ledger.contracts(),
            confirmations = config.scanner.confirmations,
            "Subsystems initialized"
        );

        Self {
            config,
            notifications,
            router,
            submitter,
            handoff,
            engine,
            scanner,
        }
    }
}
