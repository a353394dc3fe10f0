//! The external-module contract: concepts as invocable operations.
//!
//! A concept is an isolated, state-owning module with no knowledge of any
//! other concept. It exposes **actions** (may mutate state) and **queries**
//! (read-only, zero or more result rows). Concepts are self-validating:
//! malformed or forbidden input yields an error *payload*, never a panic or
//! an `Err` — module-level errors are data the engine matches like any
//! other output.
//!
//! The [`ConceptRegistry`] holds the registered concepts; the engine is its
//! only caller during cascades, and the server's passthrough routes call it
//! directly for public operations.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use miette::Diagnostic;
use rand::Rng;
use serde_json::Value;
use thiserror::Error;

use crate::record::FieldMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from concept registration and lookup.
#[derive(Debug, Error, Diagnostic)]
pub enum ConceptError {
    #[error("concept \"{name}\" is already registered")]
    #[diagnostic(
        code(weft::concept::duplicate),
        help("Each concept name may be registered once per engine.")
    )]
    Duplicate { name: String },

    #[error("no concept named \"{name}\" is registered")]
    #[diagnostic(
        code(weft::concept::not_found),
        help(
            "A rule or passthrough route references a concept the engine \
             does not know. Register it at construction, or fix the \
             operation path."
        )
    )]
    NotFound { name: String },
}

/// Result type for registry operations.
pub type ConceptResult<T> = std::result::Result<T, ConceptError>;

// ---------------------------------------------------------------------------
// Invocation results
// ---------------------------------------------------------------------------

/// What an action invocation returns: output fields or an error payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The action completed with these output fields.
    Success(FieldMap),
    /// The action rejected the invocation.
    Error(String),
}

impl Reply {
    /// A success reply with no output fields.
    pub fn empty() -> Self {
        Reply::Success(FieldMap::new())
    }

    /// A success reply with the given fields.
    pub fn ok<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        Reply::Success(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    /// An error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    /// Whether this is the error branch.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl From<Result<FieldMap, String>> for Reply {
    fn from(result: Result<FieldMap, String>) -> Self {
        match result {
            Ok(fields) => Reply::Success(fields),
            Err(message) => Reply::Error(message),
        }
    }
}

/// What a query invocation returns: zero or more rows, or an error payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    /// The result rows; empty means "no match", not an error.
    Rows(Vec<FieldMap>),
    /// The query rejected the invocation.
    Error(String),
}

impl Rows {
    /// A result of exactly one row.
    pub fn one<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        Rows::Rows(vec![fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()])
    }

    /// An empty result.
    pub fn none() -> Self {
        Rows::Rows(Vec::new())
    }

    /// An error result.
    pub fn error(message: impl Into<String>) -> Self {
        Rows::Error(message.into())
    }
}

// ---------------------------------------------------------------------------
// The trait
// ---------------------------------------------------------------------------

/// An isolated, state-owning module participating in cascades.
///
/// Implementations must be safe to call concurrently; each concept is
/// responsible for its own internal concurrency control. The engine imposes
/// no cross-cascade locking.
#[async_trait]
pub trait Concept: Send + Sync {
    /// The concept's registered name (`Library`, `Sessioning`, …).
    fn name(&self) -> &str;

    /// Invoke an action by name. Unknown actions yield an error reply.
    async fn action(&self, op: &str, input: &FieldMap) -> Reply;

    /// Invoke a query by name. Unknown queries yield an error result.
    async fn query(&self, op: &str, input: &FieldMap) -> Rows;
}

/// Registry of concepts by name.
pub struct ConceptRegistry {
    concepts: DashMap<String, Arc<dyn Concept>>,
}

impl ConceptRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            concepts: DashMap::new(),
        }
    }

    /// Register a concept. Errors if the name is already taken.
    pub fn register(&self, concept: Arc<dyn Concept>) -> ConceptResult<()> {
        let name = concept.name().to_string();
        if self.concepts.contains_key(&name) {
            return Err(ConceptError::Duplicate { name });
        }
        self.concepts.insert(name, concept);
        Ok(())
    }

    /// Look up a concept by name.
    pub fn get(&self, name: &str) -> ConceptResult<Arc<dyn Concept>> {
        self.concepts
            .get(name)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| ConceptError::NotFound {
                name: name.to_string(),
            })
    }

    /// Names of all registered concepts, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.concepts.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered concepts.
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

impl Default for ConceptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConceptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptRegistry")
            .field("concepts", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Boundary helpers
// ---------------------------------------------------------------------------

/// Extract a required string field, or the error message a concept returns.
pub fn req_str(input: &FieldMap, key: &str) -> Result<String, String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("Missing or non-string field '{key}'."))
}

/// Extract a required integer field.
pub fn req_i64(input: &FieldMap, key: &str) -> Result<i64, String> {
    input
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("Missing or non-integer field '{key}'."))
}

/// Extract a required boolean field.
pub fn req_bool(input: &FieldMap, key: &str) -> Result<bool, String> {
    input
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| format!("Missing or non-boolean field '{key}'."))
}

/// Generate a fresh prefixed identifier, e.g. `file:9f2c81d4e07a3b65`.
pub fn fresh_id(prefix: &str) -> String {
    let raw: u64 = rand::thread_rng().r#gen();
    format!("{prefix}:{raw:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Concept for Echo {
        fn name(&self) -> &str {
            "Echo"
        }

        async fn action(&self, op: &str, input: &FieldMap) -> Reply {
            match op {
                "say" => Reply::Success(input.clone()),
                other => Reply::error(format!("Unknown action '{other}'.")),
            }
        }

        async fn query(&self, op: &str, _input: &FieldMap) -> Rows {
            match op {
                "_rows" => Rows::one([("x", json!(1))]),
                other => Rows::error(format!("Unknown query '{other}'.")),
            }
        }
    }

    #[tokio::test]
    async fn registry_register_and_invoke() {
        let registry = ConceptRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();

        let concept = registry.get("Echo").unwrap();
        let mut input = FieldMap::new();
        input.insert("k".into(), json!("v"));
        assert_eq!(concept.action("say", &input).await, Reply::Success(input));
        assert!(concept.action("nope", &FieldMap::new()).await.is_error());
    }

    #[tokio::test]
    async fn duplicate_registration_rejected() {
        let registry = ConceptRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        assert!(matches!(
            registry.register(Arc::new(Echo)),
            Err(ConceptError::Duplicate { .. })
        ));
    }

    #[test]
    fn missing_concept_lookup() {
        let registry = ConceptRegistry::new();
        assert!(matches!(
            registry.get("Ghost"),
            Err(ConceptError::NotFound { .. })
        ));
    }

    #[test]
    fn field_helpers() {
        let mut map = FieldMap::new();
        map.insert("owner".into(), json!("u1"));
        map.insert("index".into(), json!(3));
        map.insert("visible".into(), json!(true));

        assert_eq!(req_str(&map, "owner").unwrap(), "u1");
        assert_eq!(req_i64(&map, "index").unwrap(), 3);
        assert!(req_bool(&map, "visible").unwrap());
        assert!(req_str(&map, "absent").is_err());
        assert!(req_i64(&map, "owner").is_err());
    }

    #[test]
    fn fresh_ids_are_prefixed_and_distinct() {
        let a = fresh_id("session");
        let b = fresh_id("session");
        assert!(a.starts_with("session:"));
        assert_ne!(a, b);
    }
}
