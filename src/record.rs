//! Operation records: the immutable facts the engine matches against.
//!
//! Every completed concept invocation produces exactly one
//! [`OperationRecord`]: the operation id, the input payload it was given,
//! and the output payload it returned (or the error it signaled). Records
//! are ordered by a per-cascade [`Seq`] and never mutated after admission.
//!
//! Concepts speak string-keyed [`FieldMap`]s at the boundary; the engine
//! interns keys into id-keyed [`Payload`]s on admission so joins stay free
//! of string comparison.

use serde_json::Value;

use crate::error::SymbolError;
use crate::symbol::{FieldId, OpId, SymbolTable};

/// Wire-level payload shape shared with concepts: a JSON object.
pub type FieldMap = serde_json::Map<String, Value>;

/// Monotonically increasing sequence number within one cascade.
///
/// Establishes happened-before between records of the same cascade; never
/// compared across cascades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Seq(pub u64);

impl std::fmt::Display for Seq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An id-keyed payload, sorted by field id for binary-search lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    fields: Vec<(FieldId, Value)>,
}

impl Payload {
    /// Build a payload from a wire map, interning every key.
    pub fn from_wire(table: &SymbolTable, map: &FieldMap) -> Result<Self, SymbolError> {
        let mut fields = Vec::with_capacity(map.len());
        for (key, value) in map {
            fields.push((table.intern_field(key)?, value.clone()));
        }
        fields.sort_by_key(|(id, _)| *id);
        Ok(Self { fields })
    }

    /// Convert back to the wire shape for concept invocation and inspection.
    pub fn to_wire(&self, table: &SymbolTable) -> FieldMap {
        self.fields
            .iter()
            .map(|(id, v)| (table.field_name(*id), v.clone()))
            .collect()
    }

    /// Look up a field value by id.
    pub fn get(&self, id: FieldId) -> Option<&Value> {
        self.fields
            .binary_search_by_key(&id, |(f, _)| *f)
            .ok()
            .map(|i| &self.fields[i].1)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the payload has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(FieldId, &Value)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &Value)> {
        self.fields.iter().map(|(id, v)| (*id, v))
    }
}

/// The result half of an operation record: a success payload or an error.
///
/// Module-level errors are ordinary data here — rules pattern-match them
/// exactly like success outputs, just on the other branch.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The operation completed and produced these output fields.
    Success(Payload),
    /// The operation signaled an error payload.
    Error(String),
}

impl Outcome {
    /// Whether this outcome is the error branch.
    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }
}

/// One immutable fact: a completed operation invocation.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    /// Per-cascade arrival order.
    pub seq: Seq,
    /// Cascade depth: 0 for the initiating record, parent depth + 1 for
    /// records produced by dispatch.
    pub depth: usize,
    /// The operation that ran.
    pub op: OpId,
    /// The input it was invoked with.
    pub input: Payload,
    /// What it returned.
    pub output: Outcome,
}
