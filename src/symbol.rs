//! Interned identifiers for fields and operations.
//!
//! Rule evaluation never compares strings: field names and operation paths
//! are resolved to [`FieldId`] / [`OpId`] once — when rules are compiled and
//! when records are admitted into a cascade — and every join after that is
//! integer comparison. The [`SymbolTable`] provides O(1) lookups in both
//! directions using paired `DashMap`s.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::SymbolError;

/// Unique, niche-optimized identifier for a field name.
///
/// Uses `NonZeroU32` so that `Option<FieldId>` is the same size as `FieldId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FieldId(NonZeroU32);

impl FieldId {
    /// Create a `FieldId` from a raw `u32`. Returns `None` if `raw` is zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(FieldId)
    }

    /// Get the underlying `u32` value.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Unique identifier for an operation path such as `Library.deleteFile`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct OpId(NonZeroU32);

impl OpId {
    /// Create an `OpId` from a raw `u32`. Returns `None` if `raw` is zero.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(OpId)
    }

    /// Get the underlying `u32` value.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// An operation path split into its concept and operation parts.
///
/// `Library.deleteFile` → concept `Library`, operation `deleteFile`.
/// Operations whose name starts with `_` are queries by convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpPath {
    /// The concept that owns the operation.
    pub concept: String,
    /// The action or query name within the concept.
    pub operation: String,
}

impl OpPath {
    /// Parse a dotted path. Returns an error if there is no single dot.
    pub fn parse(path: &str) -> Result<Self, SymbolError> {
        match path.split_once('.') {
            Some((concept, operation)) if !concept.is_empty() && !operation.is_empty() => {
                Ok(Self {
                    concept: concept.to_string(),
                    operation: operation.to_string(),
                })
            }
            _ => Err(SymbolError::MalformedOpPath {
                path: path.to_string(),
            }),
        }
    }

    /// Whether this operation is a read-only query (`_`-prefixed by convention).
    pub fn is_query(&self) -> bool {
        self.operation.starts_with('_')
    }
}

impl std::fmt::Display for OpPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.concept, self.operation)
    }
}

/// Bidirectional interning table for field names and operation paths.
///
/// Shared across all cascades of one engine; interning the same name twice
/// returns the same id.
pub struct SymbolTable {
    field_ids: DashMap<String, FieldId>,
    field_names: DashMap<FieldId, String>,
    op_ids: DashMap<String, OpId>,
    op_paths: DashMap<OpId, OpPath>,
    next_field: AtomicU32,
    next_op: AtomicU32,
}

impl SymbolTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self {
            field_ids: DashMap::new(),
            field_names: DashMap::new(),
            op_ids: DashMap::new(),
            op_paths: DashMap::new(),
            next_field: AtomicU32::new(1),
            next_op: AtomicU32::new(1),
        }
    }

    /// Intern a field name, returning its id (allocating one if new).
    pub fn intern_field(&self, name: &str) -> Result<FieldId, SymbolError> {
        if let Some(id) = self.field_ids.get(name) {
            return Ok(*id.value());
        }
        let raw = self.next_field.fetch_add(1, Ordering::Relaxed);
        let id = FieldId::new(raw).ok_or(SymbolError::Exhausted { kind: "field" })?;
        // Two threads may race on a fresh name; first insert wins and the
        // loser's id is simply never used again.
        let winner = *self
            .field_ids
            .entry(name.to_string())
            .or_insert(id)
            .value();
        if winner == id {
            self.field_names.insert(id, name.to_string());
        }
        Ok(winner)
    }

    /// Look up a field id without interning.
    pub fn lookup_field(&self, name: &str) -> Option<FieldId> {
        self.field_ids.get(name).map(|r| *r.value())
    }

    /// Resolve a field id back to its name, falling back to `field:{id}`.
    pub fn field_name(&self, id: FieldId) -> String {
        self.field_names
            .get(&id)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| format!("field:{}", id.get()))
    }

    /// Intern an operation path such as `Library.deleteFile`.
    pub fn intern_op(&self, path: &str) -> Result<OpId, SymbolError> {
        if let Some(id) = self.op_ids.get(path) {
            return Ok(*id.value());
        }
        let parsed = OpPath::parse(path)?;
        let raw = self.next_op.fetch_add(1, Ordering::Relaxed);
        let id = OpId::new(raw).ok_or(SymbolError::Exhausted { kind: "operation" })?;
        let winner = *self.op_ids.entry(path.to_string()).or_insert(id).value();
        if winner == id {
            self.op_paths.insert(id, parsed);
        }
        Ok(winner)
    }

    /// Look up an operation id without interning.
    pub fn lookup_op(&self, path: &str) -> Option<OpId> {
        self.op_ids.get(path).map(|r| *r.value())
    }

    /// Resolve an operation id back to its path.
    pub fn op_path(&self, id: OpId) -> Option<OpPath> {
        self.op_paths.get(&id).map(|r| r.value().clone())
    }

    /// Resolve an operation id to a display string, falling back to `op:{id}`.
    pub fn op_display(&self, id: OpId) -> String {
        self.op_path(id)
            .map(|p| p.to_string())
            .unwrap_or_else(|| format!("op:{}", id.get()))
    }

    /// Number of interned field names.
    pub fn field_count(&self) -> usize {
        self.field_names.len()
    }

    /// Number of interned operation paths.
    pub fn op_count(&self) -> usize {
        self.op_paths.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolTable")
            .field("fields", &self.field_count())
            .field("ops", &self.op_count())
            .finish()
    }
}
