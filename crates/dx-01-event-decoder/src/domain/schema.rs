//! Event schemas
//!
//! A schema names an event and declares its fields in order. The signature
//! topic is `keccak256("Name(type1,type2,...)")`.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use shared_types::{FieldKind, Hash};

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Carried in topics rather than data. The ledger client resolves both
    /// into positional values, so this is informational only.
    pub indexed: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            indexed: false,
        }
    }

    pub fn indexed(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            indexed: true,
            ..Self::new(name, kind)
        }
    }
}

/// Named, ordered field list of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSchema {
    name: String,
    fields: Vec<FieldSpec>,
    topic: Hash,
}

impl EventSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        let name = name.into();
        let topic = keccak256(signature(&name, &fields).as_bytes());
        Self {
            name,
            fields,
            topic,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Canonical signature, e.g. `Vote(uint256,address,bool,string,uint8)`.
    pub fn signature(&self) -> String {
        signature(&self.name, &self.fields)
    }

    /// Signature topic (`topics[0]` of matching logs).
    pub fn topic(&self) -> Hash {
        self.topic
    }
}

fn signature(name: &str, fields: &[FieldSpec]) -> String {
    let types: Vec<&str> = fields.iter().map(|f| f.kind.abi_name()).collect();
    format!("{}({})", name, types.join(","))
}
