//! Rich diagnostic error types for the weft engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives — error codes, help text, source chains — and the top-level
//! [`WeftError`] wraps them transparently. Only *engine-level defects* live
//! here: a concept reporting `{error: …}` is ordinary data, carried in
//! [`crate::record::Outcome::Error`] and matched by rules, never raised.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the weft engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum WeftError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rule(#[from] crate::rule::RuleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Concept(#[from] crate::concept::ConceptError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// Convenience alias for functions returning weft results.
pub type WeftResult<T> = std::result::Result<T, WeftError>;

// ---------------------------------------------------------------------------
// Symbol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SymbolError {
    #[error("malformed operation path \"{path}\"")]
    #[diagnostic(
        code(weft::symbol::malformed_op),
        help(
            "Operation paths are dotted `Concept.operation` pairs, e.g. \
             `Library.deleteFile` or `Sessioning._getUser`."
        )
    )]
    MalformedOpPath { path: String },

    #[error("{kind} id space exhausted")]
    #[diagnostic(
        code(weft::symbol::exhausted),
        help(
            "The interning table ran out of 32-bit ids. This requires over \
             4 billion distinct names — check for a name-generation loop."
        )
    )]
    Exhausted { kind: &'static str },
}

// ---------------------------------------------------------------------------
// Engine errors (cascade-level defects)
// ---------------------------------------------------------------------------

/// Engine-level defects: malformed rules caught at runtime, runaway
/// cascades. Non-recoverable for the cascade; they abort it and surface the
/// offending rule, without corrupting other concurrent cascades.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("cascade depth exceeded {max_depth} while firing rule \"{rule}\"")]
    #[diagnostic(
        code(weft::engine::depth_exceeded),
        help(
            "A dispatch chain re-triggered rules past the configured depth \
             guard. This usually means a rule's dispatch re-satisfies its \
             own trigger. Review \"{rule}\" for a cycle, or raise \
             `max_depth` if the chain is intentional."
        )
    )]
    DepthExceeded { rule: String, max_depth: usize },

    #[error("rule \"{rule}\" dispatched with unbound variable \"{var}\"")]
    #[diagnostic(
        code(weft::engine::unbound_dispatch),
        help(
            "A dispatch input referenced a variable no surviving frame \
             bound. This is a rule-authoring defect; compilation should \
             have caught it, so check any custom refinement step."
        )
    )]
    UnboundDispatch { rule: String, var: String },

    #[error("operation \"{op}\" names unregistered concept \"{concept}\"")]
    #[diagnostic(
        code(weft::engine::unknown_concept),
        help("Register the concept at engine construction, or fix the rule's operation path.")
    )]
    UnknownConcept { op: String, concept: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Symbol(#[from] SymbolError),
}

/// Result type for cascade execution.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_error_converts_to_weft_error() {
        let err = SymbolError::MalformedOpPath {
            path: "nodot".into(),
        };
        let weft: WeftError = err.into();
        assert!(matches!(
            weft,
            WeftError::Symbol(SymbolError::MalformedOpPath { .. })
        ));
    }

    #[test]
    fn engine_error_display_names_the_rule() {
        let err = EngineError::DepthExceeded {
            rule: "Ouroboros".into(),
            max_depth: 3,
        };
        let msg = format!("{err}");
        assert!(msg.contains("Ouroboros"));
        assert!(msg.contains('3'));
    }

    #[test]
    fn rule_error_converts_to_weft_error() {
        let err = crate::rule::RuleError::EmptyTrigger {
            rule: "Empty".into(),
        };
        let weft: WeftError = err.into();
        assert!(matches!(weft, WeftError::Rule(_)));
    }
}
