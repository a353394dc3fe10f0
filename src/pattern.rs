//! Unification: matching a pattern against a concrete record while
//! accumulating and enforcing variable bindings.
//!
//! A [`Pattern`] is a partially-concrete description of an operation: the
//! operation id plus, for input and output, field slots that are either
//! literals (must equal exactly) or variables (bind on first sight, must
//! equal on later sight). Fields present in the record but absent from the
//! pattern are ignored — a pattern is a projection, not an exact-equality
//! constraint.
//!
//! A pattern selects exactly one branch of an operation: one that declares
//! an `error` output slot matches only error records, one that does not
//! matches only success records.

use serde_json::Value;

use crate::frame::{Frame, VarId};
use crate::record::{OperationRecord, Outcome};
use crate::symbol::{FieldId, OpId};

/// One field slot in a pattern: a literal constraint or a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// The record's value must equal this exactly.
    Lit(Value),
    /// Binds on first sight; must equal the existing binding afterwards.
    Var(VarId),
}

/// A compiled trigger clause.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Operation this clause matches; mismatched ids fail without
    /// inspecting fields.
    pub op: OpId,
    /// Constraints over the record's input payload.
    pub input: Vec<(FieldId, Slot)>,
    /// Constraints over the record's success output payload. Must be empty
    /// when `error` is set.
    pub output: Vec<(FieldId, Slot)>,
    /// If set, this clause matches only the error branch, unifying the slot
    /// against the error message.
    pub error: Option<Slot>,
}

impl Pattern {
    /// Cheap pre-check: could this clause possibly match the record?
    ///
    /// Filters on operation id and branch before any field inspection.
    pub fn admits(&self, record: &OperationRecord) -> bool {
        self.op == record.op && self.error.is_some() == record.output.is_error()
    }

    /// Attempt to match this pattern against `record`, starting from
    /// `frame`.
    ///
    /// Returns the extended frame on success, `None` on any failure: id or
    /// branch mismatch, a missing field, a literal inequality, or a
    /// conflicting variable binding (the join condition across clauses).
    pub fn unify(&self, record: &OperationRecord, frame: &Frame) -> Option<Frame> {
        if !self.admits(record) {
            return None;
        }

        let mut extended = frame.clone();
        for (field, slot) in &self.input {
            let value = record.input.get(*field)?;
            if !unify_slot(slot, value, &mut extended) {
                return None;
            }
        }

        match &record.output {
            Outcome::Success(payload) => {
                for (field, slot) in &self.output {
                    let value = payload.get(*field)?;
                    if !unify_slot(slot, value, &mut extended) {
                        return None;
                    }
                }
            }
            Outcome::Error(message) => {
                // `admits` guaranteed self.error is Some here.
                let slot = self.error.as_ref()?;
                let value = Value::String(message.clone());
                if !unify_slot(slot, &value, &mut extended) {
                    return None;
                }
            }
        }

        Some(extended)
    }
}

/// Unify one slot against a concrete value, extending `frame` in place.
fn unify_slot(slot: &Slot, value: &Value, frame: &mut Frame) -> bool {
    match slot {
        Slot::Lit(expected) => expected == value,
        Slot::Var(var) => frame.bind(*var, value),
    }
}
