//! The cascade executor: admits operation records, matches rules, and runs
//! dispatches to a fixpoint.
//!
//! One call to [`Engine::submit`] runs one cascade: the submitted operation
//! is invoked and its record admitted at depth 0, then a FIFO work queue
//! drains — each admitted record is checked against every rule, and every
//! dispatch a rule fires appends a new record to the queue. The cascade
//! ends when the queue is empty (fixpoint) or a depth-guard or defect
//! aborts it. Cascades share concept state but no matching state; the
//! record log, sequence counter, and fired-set are all per-cascade.
//!
//! Firing is anchored on arrival: a rule fires only for trigger matches
//! whose supporting records include the newly admitted one, and each
//! (rule, support) combination fires at most once per cascade. This is what
//! keeps multi-clause joins from re-firing on every later record.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::concept::{ConceptRegistry, Reply, Rows};
use crate::error::{EngineError, EngineResult, WeftResult};
use crate::frame::{Frame, FrameSet};
use crate::pattern::Slot;
use crate::record::{FieldMap, OperationRecord, Outcome, Payload, Seq};
use crate::requesting::{REQUEST_FIELD, REQUEST_OP, RESPOND_OP};
use crate::rule::{compile, Bindings, CompiledRefine, CompiledRule, Rule, RuleError};
use crate::symbol::{FieldId, OpPath, SymbolTable};

/// Default cascade depth guard.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// The rule engine: registered concepts, compiled rules, and the symbol
/// table they share.
///
/// Construction compiles and validates every rule; a constructed engine
/// never hits a scope or spelling error mid-cascade. `submit` takes `&self`
/// and cascades are independent, so one engine serves concurrent requests.
pub struct Engine {
    rules: Vec<CompiledRule>,
    concepts: ConceptRegistry,
    symbols: SymbolTable,
    max_depth: usize,
    cascades_run: AtomicU64,
}

impl Engine {
    /// Build an engine from registered concepts and authored rules.
    ///
    /// Compiles every rule, rejects duplicate rule names, and verifies that
    /// every operation path a rule mentions names a registered concept.
    pub fn new(concepts: ConceptRegistry, rules: Vec<Rule>, max_depth: usize) -> WeftResult<Self> {
        let symbols = SymbolTable::new();

        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in &rules {
            if !seen.insert(rule.name.clone()) {
                return Err(RuleError::Duplicate {
                    rule: rule.name.clone(),
                }
                .into());
            }
            compiled.push(compile(rule, &symbols)?);
        }

        let engine = Self {
            rules: compiled,
            concepts,
            symbols,
            max_depth,
            cascades_run: AtomicU64::new(0),
        };
        engine.check_rule_targets()?;
        info!(
            rules = engine.rules.len(),
            concepts = engine.concepts.len(),
            max_depth,
            "engine constructed"
        );
        Ok(engine)
    }

    /// Every trigger, query, and dispatch path must name a registered
    /// concept; a typo here would otherwise surface as a rule that silently
    /// never fires.
    fn check_rule_targets(&self) -> WeftResult<()> {
        let check = |path: &OpPath| -> WeftResult<()> {
            if self.concepts.get(&path.concept).is_err() {
                return Err(EngineError::UnknownConcept {
                    op: path.to_string(),
                    concept: path.concept.clone(),
                }
                .into());
            }
            Ok(())
        };
        for rule in &self.rules {
            for pattern in &rule.trigger {
                if let Some(path) = self.symbols.op_path(pattern.op) {
                    check(&path)?;
                }
            }
            for step in &rule.refine {
                match step {
                    CompiledRefine::Query { path, .. }
                    | CompiledRefine::GuardAbsent { path, .. } => check(path)?,
                    CompiledRefine::Filter { .. } => {}
                }
            }
            for entry in &rule.dispatch {
                check(&entry.path)?;
            }
        }
        Ok(())
    }

    /// The registered concepts.
    pub fn concepts(&self) -> &ConceptRegistry {
        &self.concepts
    }

    /// Names of the registered rules, in registration order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Number of cascades run so far.
    pub fn cascades_run(&self) -> u64 {
        self.cascades_run.load(Ordering::Relaxed)
    }

    /// Submit an external request: wraps the fields in a
    /// `Requesting.request` invocation and runs the cascade it initiates.
    pub async fn handle_request(
        &self,
        path: &str,
        mut fields: FieldMap,
    ) -> EngineResult<Cascade> {
        fields.insert("path".to_string(), Value::String(path.to_string()));
        self.submit(REQUEST_OP, fields).await
    }

    /// Invoke an operation and run the cascade it initiates to fixpoint.
    pub async fn submit(&self, op_path: &str, input: FieldMap) -> EngineResult<Cascade> {
        let path = OpPath::parse(op_path)?;
        let op = self.symbols.intern_op(op_path)?;

        let mut state = CascadeState::new();
        let reply = self.invoke_action(&path, &input).await?;
        self.admit(op, &input, reply, 0, &mut state)?;

        while let Some(idx) = state.queue.pop_front() {
            for ri in 0..self.rules.len() {
                self.evaluate_rule(ri, idx, &mut state).await?;
            }
        }

        self.cascades_run.fetch_add(1, Ordering::Relaxed);
        let cascade = self.finish(state);
        info!(
            op = op_path,
            records = cascade.records.len(),
            "cascade reached fixpoint"
        );
        Ok(cascade)
    }

    // -----------------------------------------------------------------------
    // Rule evaluation
    // -----------------------------------------------------------------------

    async fn evaluate_rule(
        &self,
        ri: usize,
        idx: usize,
        state: &mut CascadeState,
    ) -> EngineResult<()> {
        let rule = &self.rules[ri];
        let new_seq = state.log[idx].seq;
        let parent_depth = state.log[idx].depth;

        // Cheap pre-check: if no clause can even admit the new record, the
        // anchored join below cannot produce anything new.
        if !rule.trigger.iter().any(|p| p.admits(&state.log[idx])) {
            return Ok(());
        }

        // Multi-clause join over the full per-cascade log, left to right.
        // Each candidate carries the seqs of the records supporting it.
        let mut candidates = vec![(Frame::new(rule.var_count()), Vec::<Seq>::new())];
        for pattern in &rule.trigger {
            let mut next = Vec::new();
            for (frame, support) in &candidates {
                for record in &state.log {
                    if let Some(extended) = pattern.unify(record, frame) {
                        let mut support = support.clone();
                        support.push(record.seq);
                        next.push((extended, support));
                    }
                }
            }
            if next.is_empty() {
                return Ok(());
            }
            candidates = next;
        }

        // Anchor on the newly admitted record and drop combinations this
        // cascade has already fired.
        let mut frames = Vec::new();
        for (frame, support) in candidates {
            if !support.contains(&new_seq) {
                continue;
            }
            if state.fired.insert((ri, support)) {
                frames.push(frame);
            }
        }
        if frames.is_empty() {
            return Ok(());
        }
        debug!(rule = %rule.name, frames = frames.len(), anchor = %new_seq, "trigger satisfied");

        let frames = self.refine(rule, FrameSet::from_frames(frames)).await?;
        if frames.is_empty() {
            debug!(rule = %rule.name, "no frame survived refinement");
            return Ok(());
        }

        // Dispatch for every surviving frame, frame order then entry order.
        let child_depth = parent_depth + 1;
        for frame in frames.iter() {
            for entry in &rule.dispatch {
                if child_depth > self.max_depth {
                    warn!(rule = %rule.name, depth = child_depth, "depth guard tripped");
                    return Err(EngineError::DepthExceeded {
                        rule: rule.name.clone(),
                        max_depth: self.max_depth,
                    });
                }
                let input = self.resolve_args(rule, &entry.args, frame)?;
                let reply = self.invoke_action(&entry.path, &input).await?;
                debug!(
                    rule = %rule.name,
                    op = %entry.path,
                    depth = child_depth,
                    error = reply.is_error(),
                    "dispatched"
                );
                self.admit(entry.op, &input, reply, child_depth, state)?;
            }
        }
        Ok(())
    }

    /// Apply the rule's refinement steps in order.
    ///
    /// Every step only narrows or extends; none may consult state mutably.
    /// A query returning zero rows (or an error) drops the frame — a failed
    /// lookup never lets stale bindings through to dispatch.
    async fn refine(&self, rule: &CompiledRule, frames: FrameSet) -> EngineResult<FrameSet> {
        let mut current = frames;
        for step in &rule.refine {
            if current.is_empty() {
                break;
            }
            match step {
                CompiledRefine::Query { path, args, bind } => {
                    let mut next = FrameSet::empty();
                    for frame in current.iter() {
                        let input = self.resolve_args(rule, args, frame)?;
                        match self.invoke_query(path, &input).await? {
                            Rows::Error(message) => {
                                warn!(rule = %rule.name, query = %path, %message, "refinement query failed; frame dropped");
                            }
                            Rows::Rows(rows) => {
                                'rows: for row in rows {
                                    let payload = Payload::from_wire(&self.symbols, &row)?;
                                    let mut extended = frame.clone();
                                    for (field, var) in bind {
                                        match payload.get(*field) {
                                            Some(value) if extended.bind(*var, value) => {}
                                            // Missing field or binding conflict:
                                            // this row contributes no frame.
                                            _ => continue 'rows,
                                        }
                                    }
                                    next.push(extended);
                                }
                            }
                        }
                    }
                    current = next;
                }
                CompiledRefine::GuardAbsent { path, args } => {
                    let mut next = FrameSet::empty();
                    for frame in current.iter() {
                        let input = self.resolve_args(rule, args, frame)?;
                        match self.invoke_query(path, &input).await? {
                            Rows::Rows(rows) if rows.is_empty() => next.push(frame.clone()),
                            Rows::Rows(_) => {}
                            Rows::Error(message) => {
                                // Cannot confirm absence; same policy as a
                                // failed lookup, the frame is dropped.
                                warn!(rule = %rule.name, query = %path, %message, "absence guard query failed; frame dropped");
                            }
                        }
                    }
                    current = next;
                }
                CompiledRefine::Filter { label, pred } => {
                    let before = current.len();
                    current.retain(|frame| pred(&Bindings::new(frame, &rule.vars)));
                    debug!(rule = %rule.name, filter = %label, kept = current.len(), dropped = before - current.len(), "filter applied");
                }
            }
        }
        Ok(current)
    }

    /// Materialize an argument mapping against a frame's bindings.
    fn resolve_args(
        &self,
        rule: &CompiledRule,
        args: &[(FieldId, Slot)],
        frame: &Frame,
    ) -> EngineResult<FieldMap> {
        let mut map = FieldMap::new();
        for (field, slot) in args {
            let value = match slot {
                Slot::Lit(value) => value.clone(),
                Slot::Var(var) => frame
                    .get(*var)
                    .cloned()
                    .ok_or_else(|| EngineError::UnboundDispatch {
                        rule: rule.name.clone(),
                        var: rule.vars[var.index()].clone(),
                    })?,
            };
            map.insert(self.symbols.field_name(*field), value);
        }
        Ok(map)
    }

    // -----------------------------------------------------------------------
    // Concept invocation and record admission
    // -----------------------------------------------------------------------

    async fn invoke_action(&self, path: &OpPath, input: &FieldMap) -> EngineResult<Reply> {
        let concept =
            self.concepts
                .get(&path.concept)
                .map_err(|_| EngineError::UnknownConcept {
                    op: path.to_string(),
                    concept: path.concept.clone(),
                })?;
        Ok(concept.action(&path.operation, input).await)
    }

    async fn invoke_query(&self, path: &OpPath, input: &FieldMap) -> EngineResult<Rows> {
        let concept =
            self.concepts
                .get(&path.concept)
                .map_err(|_| EngineError::UnknownConcept {
                    op: path.to_string(),
                    concept: path.concept.clone(),
                })?;
        Ok(concept.query(&path.operation, input).await)
    }

    /// Admit a completed invocation as an immutable record and queue it for
    /// matching.
    fn admit(
        &self,
        op: crate::symbol::OpId,
        input: &FieldMap,
        reply: Reply,
        depth: usize,
        state: &mut CascadeState,
    ) -> EngineResult<()> {
        let seq = Seq(state.next_seq);
        state.next_seq += 1;
        let output = match reply {
            Reply::Success(fields) => {
                Outcome::Success(Payload::from_wire(&self.symbols, &fields)?)
            }
            Reply::Error(message) => Outcome::Error(message),
        };
        let record = OperationRecord {
            seq,
            depth,
            op,
            input: Payload::from_wire(&self.symbols, input)?,
            output,
        };
        state.log.push(record);
        state.queue.push_back(state.log.len() - 1);
        Ok(())
    }

    /// Turn the final per-cascade log into its public view.
    fn finish(&self, state: CascadeState) -> Cascade {
        let records = state
            .log
            .into_iter()
            .map(|record| {
                let outcome = match record.output {
                    Outcome::Success(payload) => {
                        Reply::Success(payload.to_wire(&self.symbols))
                    }
                    Outcome::Error(message) => Reply::Error(message),
                };
                CascadeRecord {
                    seq: record.seq.0,
                    depth: record.depth,
                    op: self.symbols.op_display(record.op),
                    input: record.input.to_wire(&self.symbols),
                    outcome,
                }
            })
            .collect();
        Cascade { records }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.rule_names())
            .field("concepts", &self.concepts.names())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Per-cascade matching state; discarded at fixpoint.
struct CascadeState {
    log: Vec<OperationRecord>,
    queue: VecDeque<usize>,
    /// (rule index, supporting seqs) combinations that already fired.
    fired: HashSet<(usize, Vec<Seq>)>,
    next_seq: u64,
}

impl CascadeState {
    fn new() -> Self {
        Self {
            log: Vec::new(),
            queue: VecDeque::new(),
            fired: HashSet::new(),
            next_seq: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Public cascade view
// ---------------------------------------------------------------------------

/// One record of a finished cascade, in wire-level terms.
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeRecord {
    /// Per-cascade arrival order, starting at 1.
    pub seq: u64,
    /// 0 for the initiating record, parent + 1 per dispatch hop.
    pub depth: usize,
    /// Dotted operation path.
    pub op: String,
    /// The input the operation was invoked with.
    pub input: FieldMap,
    /// What it returned.
    pub outcome: Reply,
}

/// The complete, ordered record log of one finished cascade.
#[derive(Debug, Clone, Default)]
pub struct Cascade {
    records: Vec<CascadeRecord>,
}

impl Cascade {
    /// All records, in admission order.
    pub fn records(&self) -> &[CascadeRecord] {
        &self.records
    }

    /// Number of admitted records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record was admitted.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records for one operation path, in order.
    pub fn records_for(&self, op: &str) -> Vec<&CascadeRecord> {
        self.records.iter().filter(|r| r.op == op).collect()
    }

    /// The request id minted by the initiating `Requesting.request` record,
    /// if this cascade was request-initiated.
    pub fn request_id(&self) -> Option<&str> {
        let first = self.records.first()?;
        if first.op != REQUEST_OP {
            return None;
        }
        match &first.outcome {
            Reply::Success(fields) => fields.get(REQUEST_FIELD)?.as_str(),
            Reply::Error(_) => None,
        }
    }

    /// The response body successfully delivered for a request id: the
    /// respond record's input minus the id itself.
    pub fn response_for(&self, request: &str) -> Option<FieldMap> {
        self.records.iter().find_map(|record| {
            if record.op != RESPOND_OP || record.outcome.is_error() {
                return None;
            }
            if record.input.get(REQUEST_FIELD)?.as_str()? != request {
                return None;
            }
            let mut body = record.input.clone();
            body.remove(REQUEST_FIELD);
            Some(body)
        })
    }

    /// The response to the initiating request, if any.
    pub fn response(&self) -> Option<FieldMap> {
        self.response_for(self.request_id()?)
    }

    /// Check the one-respond-per-request contract over this cascade's log.
    pub fn audit(&self) -> CascadeAudit {
        let mut requests = Vec::new();
        for record in &self.records {
            if record.op != REQUEST_OP {
                continue;
            }
            if let Reply::Success(fields) = &record.outcome {
                if let Some(id) = fields.get(REQUEST_FIELD).and_then(Value::as_str) {
                    requests.push(id.to_string());
                }
            }
        }

        let respond_attempts = |id: &str| {
            self.records
                .iter()
                .filter(|r| {
                    r.op == RESPOND_OP
                        && r.input.get(REQUEST_FIELD).and_then(Value::as_str) == Some(id)
                })
                .count()
        };

        let mut audit = CascadeAudit::default();
        for id in requests {
            match respond_attempts(&id) {
                0 => audit.unanswered.push(id),
                1 => {}
                _ => audit.multiple.push(id),
            }
        }
        audit
    }
}

/// Result of [`Cascade::audit`]: requests that broke the respond contract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CascadeAudit {
    /// Requests no rule responded to.
    pub unanswered: Vec<String>,
    /// Requests more than one rule tried to respond to.
    pub multiple: Vec<String>,
}

impl CascadeAudit {
    /// Whether every request got exactly one respond dispatch.
    pub fn is_clean(&self) -> bool {
        self.unanswered.is_empty() && self.multiple.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::concept::{req_str, Concept};
    use crate::requesting::Requesting;
    use crate::rule::{lit, var, NO_FIELDS};

    fn wire(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Echoes its input back; `fail` errors with its `message` field.
    struct Relay {
        name: &'static str,
    }

    #[async_trait]
    impl Concept for Relay {
        fn name(&self) -> &str {
            self.name
        }

        async fn action(&self, op: &str, input: &FieldMap) -> Reply {
            match op {
                "send" | "receive" => Reply::Success(input.clone()),
                "fail" => Reply::error(
                    req_str(input, "message").unwrap_or_else(|_| "failed".to_string()),
                ),
                other => Reply::error(format!("Unknown action '{other}'.")),
            }
        }

        async fn query(&self, op: &str, _input: &FieldMap) -> Rows {
            Rows::error(format!("Unknown query '{op}'."))
        }
    }

    /// A fixed-rows query concept, for fan-out and guard tests.
    struct Shelf {
        rows: Vec<FieldMap>,
    }

    #[async_trait]
    impl Concept for Shelf {
        fn name(&self) -> &str {
            "Shelf"
        }

        async fn action(&self, op: &str, input: &FieldMap) -> Reply {
            match op {
                "touch" => Reply::Success(input.clone()),
                other => Reply::error(format!("Unknown action '{other}'.")),
            }
        }

        async fn query(&self, op: &str, _input: &FieldMap) -> Rows {
            match op {
                "_all" => Rows::Rows(self.rows.clone()),
                other => Rows::error(format!("Unknown query '{other}'.")),
            }
        }
    }

    fn registry(extra: Vec<Arc<dyn Concept>>) -> ConceptRegistry {
        let registry = ConceptRegistry::new();
        registry.register(Arc::new(Requesting::new())).unwrap();
        registry.register(Arc::new(Relay { name: "Ping" })).unwrap();
        registry.register(Arc::new(Relay { name: "Pong" })).unwrap();
        for concept in extra {
            registry.register(concept).unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn single_clause_rule_fires_once() {
        let rules = vec![Rule::on("PingPong")
            .when("Ping.send", [("value", var("value"))], NO_FIELDS)
            .then("Pong.receive", [("value", var("value"))])
            .build()];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .submit("Ping.send", wire(&[("value", json!(7))]))
            .await
            .unwrap();
        assert_eq!(cascade.len(), 2);
        let received = cascade.records_for("Pong.receive");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].input, wire(&[("value", json!(7))]));
        assert_eq!(received[0].depth, 1);
    }

    #[tokio::test]
    async fn rule_with_unknown_concept_rejected_at_construction() {
        let rules = vec![Rule::on("Ghost")
            .when("Ping.send", NO_FIELDS, NO_FIELDS)
            .then("Phantom.receive", NO_FIELDS)
            .build()];
        let err = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap_err();
        assert!(format!("{err}").contains("Phantom"));
    }

    #[tokio::test]
    async fn two_clause_join_fires_only_when_both_present() {
        // Pong.receive joins the earlier Ping.send on `value`.
        let rules = vec![
            Rule::on("Forward")
                .when("Ping.send", [("value", var("value"))], NO_FIELDS)
                .then("Pong.receive", [("value", var("value"))])
                .build(),
            Rule::on("Joined")
                .when("Ping.send", [("value", var("value"))], NO_FIELDS)
                .when("Pong.receive", [("value", var("value"))], NO_FIELDS)
                .then("Pong.send", [("value", var("value"))])
                .build(),
        ];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .submit("Ping.send", wire(&[("value", json!("x"))]))
            .await
            .unwrap();
        // Ping.send, Pong.receive (Forward), Pong.send (Joined) — the join
        // fires exactly once even though both of its clauses re-match when
        // Pong.send is admitted.
        assert_eq!(cascade.len(), 3);
        assert_eq!(cascade.records_for("Pong.send").len(), 1);
        assert_eq!(cascade.records_for("Pong.send")[0].depth, 2);
    }

    #[tokio::test]
    async fn join_on_disagreeing_values_does_not_fire() {
        let rules = vec![
            Rule::on("Forward")
                .when("Ping.send", [("value", var("value"))], NO_FIELDS)
                .then("Pong.receive", [("value", lit("other"))])
                .build(),
            Rule::on("Joined")
                .when("Ping.send", [("value", var("value"))], NO_FIELDS)
                .when("Pong.receive", [("value", var("value"))], NO_FIELDS)
                .then("Pong.send", [("value", var("value"))])
                .build(),
        ];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .submit("Ping.send", wire(&[("value", json!("x"))]))
            .await
            .unwrap();
        assert!(cascade.records_for("Pong.send").is_empty());
    }

    #[tokio::test]
    async fn query_fan_out_dispatches_per_row() {
        let shelf = Shelf {
            rows: vec![
                wire(&[("file", json!("f1"))]),
                wire(&[("file", json!("f2"))]),
                wire(&[("file", json!("f3"))]),
            ],
        };
        let rules = vec![Rule::on("TouchAll")
            .when("Ping.send", [("owner", var("owner"))], NO_FIELDS)
            .query("Shelf._all", [("owner", var("owner"))], [("file", "file")])
            .then("Shelf.touch", [("file", var("file"))])
            .build()];
        let engine =
            Engine::new(registry(vec![Arc::new(shelf)]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .submit("Ping.send", wire(&[("owner", json!("u1"))]))
            .await
            .unwrap();
        let touched: Vec<_> = cascade
            .records_for("Shelf.touch")
            .iter()
            .map(|r| r.input["file"].clone())
            .collect();
        assert_eq!(touched, vec![json!("f1"), json!("f2"), json!("f3")]);
    }

    #[tokio::test]
    async fn empty_query_result_drops_the_frame() {
        let shelf = Shelf { rows: vec![] };
        let rules = vec![Rule::on("TouchAll")
            .when("Ping.send", [("owner", var("owner"))], NO_FIELDS)
            .query("Shelf._all", [("owner", var("owner"))], [("file", "file")])
            .then("Shelf.touch", [("file", var("file"))])
            .build()];
        let engine =
            Engine::new(registry(vec![Arc::new(shelf)]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .submit("Ping.send", wire(&[("owner", json!("u1"))]))
            .await
            .unwrap();
        // No stale dispatch: the lookup found nothing, so nothing fires.
        assert_eq!(cascade.len(), 1);
    }

    #[tokio::test]
    async fn absence_guard_keeps_frame_only_when_no_rows() {
        let shelf = Shelf {
            rows: vec![wire(&[("file", json!("f1"))])],
        };
        let rules = vec![
            Rule::on("WhenPresent")
                .when("Ping.send", NO_FIELDS, NO_FIELDS)
                .guard_absent("Shelf._all", NO_FIELDS)
                .then("Pong.receive", [("marker", lit("absent"))])
                .build(),
        ];
        let engine =
            Engine::new(registry(vec![Arc::new(shelf)]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine.submit("Ping.send", FieldMap::new()).await.unwrap();
        assert!(cascade.records_for("Pong.receive").is_empty());
    }

    #[tokio::test]
    async fn filter_narrows_frames() {
        let rules = vec![Rule::on("Gate")
            .when("Ping.send", [("value", var("value"))], NO_FIELDS)
            .filter("positive value", |b| {
                b.get("value").and_then(Value::as_i64).is_some_and(|v| v > 0)
            })
            .then("Pong.receive", [("value", var("value"))])
            .build()];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let hit = engine
            .submit("Ping.send", wire(&[("value", json!(3))]))
            .await
            .unwrap();
        assert_eq!(hit.records_for("Pong.receive").len(), 1);

        let miss = engine
            .submit("Ping.send", wire(&[("value", json!(-3))]))
            .await
            .unwrap();
        assert!(miss.records_for("Pong.receive").is_empty());
    }

    #[tokio::test]
    async fn error_branch_is_exclusive() {
        let rules = vec![
            Rule::on("OnSuccess")
                .when("Ping.fail", NO_FIELDS, [("message", var("message"))])
                .then("Pong.receive", [("branch", lit("success"))])
                .build(),
            Rule::on("OnError")
                .when("Ping.fail", NO_FIELDS, [("error", var("error"))])
                .then("Pong.receive", [("branch", lit("error")), ("error", var("error"))])
                .build(),
        ];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .submit("Ping.fail", wire(&[("message", json!("boom"))]))
            .await
            .unwrap();
        let received = cascade.records_for("Pong.receive");
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].input["branch"], json!("error"));
        assert_eq!(received[0].input["error"], json!("boom"));
    }

    #[tokio::test]
    async fn depth_guard_aborts_self_triggering_rule() {
        let rules = vec![Rule::on("Ouroboros")
            .when("Ping.send", [("value", var("value"))], NO_FIELDS)
            .then("Ping.send", [("value", var("value"))])
            .build()];
        let engine = Engine::new(registry(vec![]), rules, 3).unwrap();

        let err = engine
            .submit("Ping.send", wire(&[("value", json!(1))]))
            .await
            .unwrap_err();
        match err {
            EngineError::DepthExceeded { rule, max_depth } => {
                assert_eq!(rule, "Ouroboros");
                assert_eq!(max_depth, 3);
            }
            other => panic!("expected DepthExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn request_response_round_trip_and_audit() {
        let rules = vec![
            Rule::on("EchoRoute")
                .when(
                    "Requesting.request",
                    [("path", lit("/echo")), ("value", var("value"))],
                    [("request", var("request"))],
                )
                .then(
                    "Requesting.respond",
                    [("request", var("request")), ("value", var("value"))],
                )
                .build(),
        ];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .handle_request("/echo", wire(&[("value", json!(42))]))
            .await
            .unwrap();
        assert!(cascade.audit().is_clean());
        assert_eq!(cascade.response().unwrap(), wire(&[("value", json!(42))]));
    }

    #[tokio::test]
    async fn unrouted_request_shows_up_unanswered() {
        let rules = vec![Rule::on("EchoRoute")
            .when(
                "Requesting.request",
                [("path", lit("/echo"))],
                [("request", var("request"))],
            )
            .then("Requesting.respond", [("request", var("request"))])
            .build()];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .handle_request("/nowhere", FieldMap::new())
            .await
            .unwrap();
        let audit = cascade.audit();
        assert_eq!(audit.unanswered.len(), 1);
        assert!(cascade.response().is_none());
    }

    #[tokio::test]
    async fn extra_record_fields_are_ignored_by_patterns() {
        let rules = vec![Rule::on("Partial")
            .when("Ping.send", [("value", var("value"))], NO_FIELDS)
            .then("Pong.receive", [("value", var("value"))])
            .build()];
        let engine = Engine::new(registry(vec![]), rules, DEFAULT_MAX_DEPTH).unwrap();

        let cascade = engine
            .submit(
                "Ping.send",
                wire(&[("value", json!(1)), ("noise", json!("ignored"))]),
            )
            .await
            .unwrap();
        assert_eq!(cascade.records_for("Pong.receive").len(), 1);
    }
}
