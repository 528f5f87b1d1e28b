//! Event Decoder - schema lookup and field validation

use crate::domain::{EventSchema, MarketEvent};
use crate::error::{DecodeError, DecodeResult};
use crate::ports::EventSchemaProvider;
use shared_types::{Address, FieldMap, Hash, LedgerEvent, RawLog};
use std::sync::Arc;
use tracing::trace;

/// Decodes raw logs of the known contract set.
#[derive(Clone)]
pub struct EventDecoder {
    provider: Arc<dyn EventSchemaProvider>,
}

impl EventDecoder {
    pub fn new(provider: Arc<dyn EventSchemaProvider>) -> Self {
        Self { provider }
    }

    /// Contracts to scan.
    pub fn contracts(&self) -> Vec<Address> {
        self.provider.contracts()
    }

    /// Signature topics to scan for.
    pub fn topics(&self) -> Vec<Hash> {
        self.provider.topics()
    }

    /// Name and validate a raw log.
    pub fn decode(&self, log: &RawLog) -> DecodeResult<LedgerEvent> {
        let schemas = self
            .provider
            .schemas(&log.address)
            .ok_or(DecodeError::UnknownContract {
                contract: log.address,
            })?;
        let topic = log.topics.first().ok_or(DecodeError::MissingTopic)?;
        let schema = schemas
            .iter()
            .find(|s| &s.topic() == topic)
            .ok_or_else(|| DecodeError::UnknownEvent {
                contract: log.address,
                topic: hex::encode(topic),
            })?;

        let fields = validate_fields(schema, log)?;
        trace!(event = schema.name(), position = %log.position(), "Decoded log");

        Ok(LedgerEvent {
            contract: log.address,
            name: schema.name().to_string(),
            block_number: log.block_number,
            log_index: log.log_index,
            fields,
        })
    }

    /// Decode straight to the typed event.
    pub fn decode_market(&self, log: &RawLog) -> DecodeResult<(LedgerEvent, MarketEvent)> {
        let event = self.decode(log)?;
        let market = MarketEvent::try_from(&event)?;
        Ok((event, market))
    }
}

fn validate_fields(schema: &EventSchema, log: &RawLog) -> DecodeResult<FieldMap> {
    if schema.fields().len() != log.fields.len() {
        return Err(DecodeError::FieldCountMismatch {
            event: schema.name().to_string(),
            expected: schema.fields().len(),
            actual: log.fields.len(),
        });
    }

    let mut fields = FieldMap::new();
    for (param, value) in schema.fields().iter().zip(&log.fields) {
        if param.kind != value.kind() {
            return Err(DecodeError::FieldTypeMismatch {
                event: schema.name().to_string(),
                field: param.name.clone(),
                expected: param.kind,
                actual: value.kind(),
            });
        }
        fields.push(param.name.clone(), value.clone());
    }
    Ok(fields)
}
