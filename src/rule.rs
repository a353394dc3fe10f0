//! Rule (sync) definitions: declarative trigger → refine → dispatch units.
//!
//! Rules are authored with string field and variable names and compiled once
//! at engine construction into id-based [`Pattern`]s, so evaluation never
//! touches strings and scope errors surface at registration, not mid-cascade.
//!
//! A rule has three parts:
//!
//! - **when**: an ordered list of operation patterns that must all be
//!   satisfiable under one shared set of bindings (a multi-clause join).
//!   An output field named `error` selects the error branch of the
//!   operation; its absence selects the success branch.
//! - **refine** (optional): declared read-only steps that narrow or extend
//!   the frame set — an external query with explicit argument and binding
//!   mappings, an absence guard, or a predicate filter. A query yielding no
//!   rows drops the frame; it never lets stale bindings through.
//! - **then**: operations to dispatch for every surviving frame, inputs
//!   expressed in terms of bound variables.

use std::collections::HashMap;
use std::sync::Arc;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::frame::{Frame, VarId};
use crate::pattern::{Pattern, Slot};
use crate::symbol::{FieldId, OpId, OpPath, SymbolTable};

/// Output field name that selects an operation's error branch.
pub const ERROR_FIELD: &str = "error";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors detected while compiling and validating rules.
#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("rule \"{rule}\" has an empty trigger")]
    #[diagnostic(
        code(weft::rule::empty_trigger),
        help("A rule must have at least one `when` clause to ever fire.")
    )]
    EmptyTrigger { rule: String },

    #[error("rule \"{rule}\" uses unbound variable \"{var}\" in {site}")]
    #[diagnostic(
        code(weft::rule::unbound_variable),
        help(
            "Every variable referenced by a query argument or dispatch input \
             must be bound earlier: by a trigger clause or by a preceding \
             query's bind list. Check the variable spelling and step order."
        )
    )]
    UnboundVariable {
        rule: String,
        var: String,
        site: &'static str,
    },

    #[error("rule \"{rule}\" mixes an error slot with success outputs in clause {clause}")]
    #[diagnostic(
        code(weft::rule::mixed_error_output),
        help(
            "A clause matches either the success branch or the error branch \
             of an operation, never both. Keep `error` as the only output \
             field of an error-branch clause."
        )
    )]
    MixedErrorOutput { rule: String, clause: usize },

    #[error("duplicate rule name \"{rule}\"")]
    #[diagnostic(
        code(weft::rule::duplicate),
        help("Rule names identify the offender in cascade diagnostics; keep them unique.")
    )]
    Duplicate { rule: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Symbol(#[from] crate::error::SymbolError),
}

/// Result type for rule compilation.
pub type RuleResult<T> = std::result::Result<T, RuleError>;

// ---------------------------------------------------------------------------
// Authoring surface
// ---------------------------------------------------------------------------

/// A field value in a pattern or dispatch: a variable reference or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Reference to a rule-scoped variable by name.
    Var(String),
    /// A concrete value that must (pattern) or will (dispatch) equal exactly.
    Lit(Value),
}

/// Shorthand for a variable term.
pub fn var(name: &str) -> Term {
    Term::Var(name.to_string())
}

/// Shorthand for a literal term.
pub fn lit(value: impl Into<Value>) -> Term {
    Term::Lit(value.into())
}

/// An empty field mapping, for clauses that constrain nothing.
pub const NO_FIELDS: [(&str, Term); 0] = [];

/// One trigger clause: an operation pattern over input and output fields.
#[derive(Debug, Clone)]
pub struct ActionPattern {
    /// Dotted operation path, e.g. `Requesting.request`.
    pub op: String,
    /// Input field constraints.
    pub input: Vec<(String, Term)>,
    /// Output field constraints; a field named `error` selects the error
    /// branch.
    pub output: Vec<(String, Term)>,
}

/// A declared refinement step.
#[derive(Clone)]
pub enum Refine {
    /// Call an external query per frame; for every result row, extend the
    /// frame by binding each listed row field into a variable. Zero rows
    /// (or a query error) drops the frame.
    Query {
        /// Dotted query path, e.g. `Sessioning._getUser`.
        op: String,
        /// Query arguments built from bound variables and literals.
        args: Vec<(String, Term)>,
        /// `(row field, variable)` pairs bound from each result row.
        bind: Vec<(String, String)>,
    },
    /// Keep the frame only when the query yields no rows — the
    /// negation-as-absence used by auth-error rules.
    GuardAbsent {
        /// Dotted query path.
        op: String,
        /// Query arguments built from bound variables and literals.
        args: Vec<(String, Term)>,
    },
    /// Keep the frame only when the predicate over its bindings holds.
    Filter {
        /// Label used in diagnostics and logs.
        label: String,
        /// The predicate.
        pred: Arc<dyn Fn(&Bindings<'_>) -> bool + Send + Sync>,
    },
}

impl std::fmt::Debug for Refine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Refine::Query { op, args, bind } => f
                .debug_struct("Query")
                .field("op", op)
                .field("args", args)
                .field("bind", bind)
                .finish(),
            Refine::GuardAbsent { op, args } => f
                .debug_struct("GuardAbsent")
                .field("op", op)
                .field("args", args)
                .finish(),
            Refine::Filter { label, .. } => {
                f.debug_struct("Filter").field("label", label).finish()
            }
        }
    }
}

/// One dispatch entry: the operation to invoke and its input mapping.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// Dotted action path, e.g. `Library.deleteFile`.
    pub op: String,
    /// Input fields built from bound variables and literals.
    pub args: Vec<(String, Term)>,
}

/// A declarative sync: trigger, optional refinement, dispatch list.
///
/// Registered once at engine construction; immutable thereafter.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique name, used in diagnostics (`DeleteLibraryRequest` etc.).
    pub name: String,
    /// The trigger pattern list (multi-clause join).
    pub when: Vec<ActionPattern>,
    /// Refinement steps, applied in order.
    pub refine: Vec<Refine>,
    /// Operations dispatched for every surviving frame.
    pub then: Vec<Dispatch>,
}

impl Rule {
    /// Start building a rule with the given name.
    pub fn on(name: &str) -> RuleBuilder {
        RuleBuilder {
            rule: Rule {
                name: name.to_string(),
                when: Vec::new(),
                refine: Vec::new(),
                then: Vec::new(),
            },
        }
    }
}

/// Fluent builder for [`Rule`].
#[derive(Debug)]
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    /// Add a trigger clause.
    pub fn when<I, O>(mut self, op: &str, input: I, output: O) -> Self
    where
        I: IntoIterator<Item = (&'static str, Term)>,
        O: IntoIterator<Item = (&'static str, Term)>,
    {
        self.rule.when.push(ActionPattern {
            op: op.to_string(),
            input: input
                .into_iter()
                .map(|(k, t)| (k.to_string(), t))
                .collect(),
            output: output
                .into_iter()
                .map(|(k, t)| (k.to_string(), t))
                .collect(),
        });
        self
    }

    /// Add a query refinement step.
    pub fn query<A, B>(mut self, op: &str, args: A, bind: B) -> Self
    where
        A: IntoIterator<Item = (&'static str, Term)>,
        B: IntoIterator<Item = (&'static str, &'static str)>,
    {
        self.rule.refine.push(Refine::Query {
            op: op.to_string(),
            args: args.into_iter().map(|(k, t)| (k.to_string(), t)).collect(),
            bind: bind
                .into_iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    /// Add an absence-guard refinement step.
    pub fn guard_absent<A>(mut self, op: &str, args: A) -> Self
    where
        A: IntoIterator<Item = (&'static str, Term)>,
    {
        self.rule.refine.push(Refine::GuardAbsent {
            op: op.to_string(),
            args: args.into_iter().map(|(k, t)| (k.to_string(), t)).collect(),
        });
        self
    }

    /// Add a predicate filter refinement step.
    pub fn filter(
        mut self,
        label: &str,
        pred: impl Fn(&Bindings<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.rule.refine.push(Refine::Filter {
            label: label.to_string(),
            pred: Arc::new(pred),
        });
        self
    }

    /// Add a dispatch entry.
    pub fn then<A>(mut self, op: &str, args: A) -> Self
    where
        A: IntoIterator<Item = (&'static str, Term)>,
    {
        self.rule.then.push(Dispatch {
            op: op.to_string(),
            args: args.into_iter().map(|(k, t)| (k.to_string(), t)).collect(),
        });
        self
    }

    /// Finish building.
    pub fn build(self) -> Rule {
        self.rule
    }
}

/// Name-based read access to a frame's bindings, for filter predicates.
pub struct Bindings<'a> {
    frame: &'a Frame,
    vars: &'a [String],
}

impl<'a> Bindings<'a> {
    pub(crate) fn new(frame: &'a Frame, vars: &'a [String]) -> Self {
        Self { frame, vars }
    }

    /// The bound value of a variable, if any.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.vars.iter().position(|v| v == name)?;
        self.frame.get(VarId(idx as u16))
    }
}

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// A compiled refinement step with interned identifiers.
#[derive(Clone)]
pub(crate) enum CompiledRefine {
    Query {
        path: OpPath,
        args: Vec<(FieldId, Slot)>,
        bind: Vec<(FieldId, VarId)>,
    },
    GuardAbsent {
        path: OpPath,
        args: Vec<(FieldId, Slot)>,
    },
    Filter {
        label: String,
        pred: Arc<dyn Fn(&Bindings<'_>) -> bool + Send + Sync>,
    },
}

impl std::fmt::Debug for CompiledRefine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query { path, args, bind } => f
                .debug_struct("Query")
                .field("path", path)
                .field("args", args)
                .field("bind", bind)
                .finish(),
            Self::GuardAbsent { path, args } => f
                .debug_struct("GuardAbsent")
                .field("path", path)
                .field("args", args)
                .finish(),
            Self::Filter { label, .. } => f
                .debug_struct("Filter")
                .field("label", label)
                .finish_non_exhaustive(),
        }
    }
}

/// A compiled dispatch entry.
#[derive(Debug, Clone)]
pub(crate) struct CompiledDispatch {
    pub op: OpId,
    pub path: OpPath,
    pub args: Vec<(FieldId, Slot)>,
}

/// A rule with every name resolved to an id and every scope checked.
#[derive(Clone, Debug)]
pub(crate) struct CompiledRule {
    pub name: String,
    /// Declared variables in first-use order; `VarId` indexes into this.
    pub vars: Vec<String>,
    pub trigger: Vec<Pattern>,
    pub refine: Vec<CompiledRefine>,
    pub dispatch: Vec<CompiledDispatch>,
}

impl CompiledRule {
    pub fn var_count(&self) -> usize {
        self.vars.len()
    }
}

/// Per-rule variable scope built up during compilation.
struct VarScope {
    names: Vec<String>,
    by_name: HashMap<String, VarId>,
}

impl VarScope {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Declare-or-reuse a variable (patterns and query binds declare).
    fn declare(&mut self, name: &str) -> VarId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = VarId(self.names.len() as u16);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Reference a variable that must already be declared.
    fn reference(&self, name: &str) -> Option<VarId> {
        self.by_name.get(name).copied()
    }
}

/// Compile and validate a rule against the engine's symbol table.
pub(crate) fn compile(rule: &Rule, table: &SymbolTable) -> RuleResult<CompiledRule> {
    if rule.when.is_empty() {
        return Err(RuleError::EmptyTrigger {
            rule: rule.name.clone(),
        });
    }

    let mut scope = VarScope::new();
    let mut trigger = Vec::with_capacity(rule.when.len());

    for (clause_idx, clause) in rule.when.iter().enumerate() {
        let op = table.intern_op(&clause.op)?;
        let input = compile_declaring(&clause.input, table, &mut scope)?;

        let mut output = Vec::new();
        let mut error = None;
        for (name, term) in &clause.output {
            let slot = declare_slot(term, &mut scope);
            if name == ERROR_FIELD {
                error = Some(slot);
            } else {
                output.push((table.intern_field(name)?, slot));
            }
        }
        if error.is_some() && !output.is_empty() {
            return Err(RuleError::MixedErrorOutput {
                rule: rule.name.clone(),
                clause: clause_idx,
            });
        }

        trigger.push(Pattern {
            op,
            input,
            output,
            error,
        });
    }

    let mut refine = Vec::with_capacity(rule.refine.len());
    for step in &rule.refine {
        match step {
            Refine::Query { op, args, bind } => {
                let path = OpPath::parse(op)?;
                table.intern_op(op)?;
                let args = compile_referencing(args, table, &scope, &rule.name, "query arguments")?;
                let bind = bind
                    .iter()
                    .map(|(field, var_name)| {
                        Ok((table.intern_field(field)?, scope.declare(var_name)))
                    })
                    .collect::<RuleResult<Vec<_>>>()?;
                refine.push(CompiledRefine::Query { path, args, bind });
            }
            Refine::GuardAbsent { op, args } => {
                let path = OpPath::parse(op)?;
                table.intern_op(op)?;
                let args =
                    compile_referencing(args, table, &scope, &rule.name, "guard arguments")?;
                refine.push(CompiledRefine::GuardAbsent { path, args });
            }
            Refine::Filter { label, pred } => {
                refine.push(CompiledRefine::Filter {
                    label: label.clone(),
                    pred: Arc::clone(pred),
                });
            }
        }
    }

    let mut dispatch = Vec::with_capacity(rule.then.len());
    for entry in &rule.then {
        let path = OpPath::parse(&entry.op)?;
        let op = table.intern_op(&entry.op)?;
        let args =
            compile_referencing(&entry.args, table, &scope, &rule.name, "dispatch inputs")?;
        dispatch.push(CompiledDispatch { op, path, args });
    }

    Ok(CompiledRule {
        name: rule.name.clone(),
        vars: scope.names,
        trigger,
        refine,
        dispatch,
    })
}

/// Compile a field mapping in declaring position (trigger clauses).
fn compile_declaring(
    fields: &[(String, Term)],
    table: &SymbolTable,
    scope: &mut VarScope,
) -> RuleResult<Vec<(FieldId, Slot)>> {
    fields
        .iter()
        .map(|(name, term)| Ok((table.intern_field(name)?, declare_slot(term, scope))))
        .collect()
}

fn declare_slot(term: &Term, scope: &mut VarScope) -> Slot {
    match term {
        Term::Var(name) => Slot::Var(scope.declare(name)),
        Term::Lit(value) => Slot::Lit(value.clone()),
    }
}

/// Compile a field mapping in referencing position (query args, dispatch
/// inputs): every variable must already be bound by an earlier step.
fn compile_referencing(
    fields: &[(String, Term)],
    table: &SymbolTable,
    scope: &VarScope,
    rule: &str,
    site: &'static str,
) -> RuleResult<Vec<(FieldId, Slot)>> {
    fields
        .iter()
        .map(|(name, term)| {
            let slot = match term {
                Term::Var(var_name) => Slot::Var(scope.reference(var_name).ok_or_else(|| {
                    RuleError::UnboundVariable {
                        rule: rule.to_string(),
                        var: var_name.clone(),
                        site,
                    }
                })?),
                Term::Lit(value) => Slot::Lit(value.clone()),
            };
            Ok((table.intern_field(name)?, slot))
        })
        .collect()
}
