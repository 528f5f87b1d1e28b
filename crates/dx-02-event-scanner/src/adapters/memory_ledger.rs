//! In-process ledger
//!
//! Holds logs and a head height in memory. Used by the development runtime
//! and by tests to script ledger behaviour: outages, reorgs, rejected
//! submissions and receipt outcomes.

use async_trait::async_trait;
use dx_01_event_decoder::keccak256;
use parking_lot::Mutex;
use shared_types::{
    BlockNumber, Hash, LedgerClient, LedgerError, LogFilter, RawLog, ReceiptStatus,
};
use std::collections::HashMap;
use tracing::trace;

#[derive(Debug)]
struct LedgerState {
    head: BlockNumber,
    logs: Vec<RawLog>,
    unavailable: u32,
    submit_error: Option<LedgerError>,
    submitted: Vec<(Hash, Vec<u8>)>,
    receipts: HashMap<Hash, ReceiptStatus>,
    default_receipt: ReceiptStatus,
    get_logs_calls: u64,
}

#[derive(Debug)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                head: 0,
                logs: Vec::new(),
                unavailable: 0,
                submit_error: None,
                submitted: Vec::new(),
                receipts: HashMap::new(),
                default_receipt: ReceiptStatus::Confirmed,
                get_logs_calls: 0,
            }),
        }
    }

    pub fn head(&self) -> BlockNumber {
        self.state.lock().head
    }

    pub fn set_head(&self, head: BlockNumber) {
        self.state.lock().head = head;
    }

    pub fn advance_head(&self, blocks: u64) -> BlockNumber {
        let mut state = self.state.lock();
        state.head = state.head.saturating_add(blocks);
        state.head
    }

    /// Append a log. Its block may be ahead of the head.
    pub fn push_log(&self, log: RawLog) {
        self.state.lock().logs.push(log);
    }

    /// Mark every log of `block` as removed by a reorg.
    pub fn reorg(&self, block: BlockNumber) {
        for log in self.state.lock().logs.iter_mut() {
            if log.block_number == block {
                log.removed = true;
            }
        }
    }

    /// The next `n` requests of any kind fail with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unavailable = n;
    }

    /// The next submission fails with `error`.
    pub fn fail_next_submission(&self, error: LedgerError) {
        self.state.lock().submit_error = Some(error);
    }

    /// Receipt returned for submissions without an explicit one.
    pub fn set_default_receipt(&self, status: ReceiptStatus) {
        self.state.lock().default_receipt = status;
    }

    pub fn set_receipt(&self, hash: Hash, status: ReceiptStatus) {
        self.state.lock().receipts.insert(hash, status);
    }

    /// Raw bytes of every accepted submission, in order.
    pub fn submitted(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .submitted
            .iter()
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submitted.len()
    }

    pub fn get_logs_calls(&self) -> u64 {
        self.state.lock().get_logs_calls
    }

    fn check_available(state: &mut LedgerState) -> Result<(), LedgerError> {
        if state.unavailable > 0 {
            state.unavailable -= 1;
            return Err(LedgerError::Unavailable("in-memory ledger offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn block_number(&self) -> Result<BlockNumber, LedgerError> {
        let mut state = self.state.lock();
        Self::check_available(&mut state)?;
        Ok(state.head)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, LedgerError> {
        let mut state = self.state.lock();
        state.get_logs_calls += 1;
        Self::check_available(&mut state)?;
        let logs: Vec<RawLog> = state
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        trace!(
            from = filter.from_block,
            to = filter.to_block,
            count = logs.len(),
            "get_logs"
        );
        Ok(logs)
    }

    async fn submit_signed_transaction(&self, bytes: Vec<u8>) -> Result<Hash, LedgerError> {
        let mut state = self.state.lock();
        Self::check_available(&mut state)?;
        if let Some(error) = state.submit_error.take() {
            return Err(error);
        }
        let hash = keccak256(&bytes);
        state.submitted.push((hash, bytes));
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: &Hash) -> Result<ReceiptStatus, LedgerError> {
        let mut state = self.state.lock();
        Self::check_available(&mut state)?;
        if let Some(status) = state.receipts.get(hash) {
            return Ok(*status);
        }
        if state.submitted.iter().any(|(h, _)| h == hash) {
            return Ok(state.default_receipt);
        }
        Err(LedgerError::NotFound(format!("receipt 0x{}", hex::encode(hash))))
    }
}
