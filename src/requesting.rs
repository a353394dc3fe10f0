//! The transport-facing concept: every external request enters and leaves
//! the engine through `Requesting`.
//!
//! `Requesting.request` mints a request id and produces the record that
//! triggers route rules; `Requesting.respond` is dispatched by exactly one
//! rule per request. The response body itself lives in the cascade's record
//! log, where the transport layer collects it; `Requesting` keeps only the
//! set of answered ids so a second `respond` for the same request is
//! refused. It holds no domain state and knows nothing about the concepts
//! behind the routes.

use dashmap::DashSet;
use serde_json::Value;

use crate::concept::{fresh_id, req_str, Concept, Reply, Rows};
use crate::record::FieldMap;

/// Field carrying the request id through request and respond payloads.
pub const REQUEST_FIELD: &str = "request";

/// Dotted path of the request action.
pub const REQUEST_OP: &str = "Requesting.request";

/// Dotted path of the respond action.
pub const RESPOND_OP: &str = "Requesting.respond";

/// The request/response rendezvous concept.
#[derive(Debug, Default)]
pub struct Requesting {
    /// Request ids that have already been answered.
    answered: DashSet<String>,
}

impl Requesting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a `respond` has been accepted for this request id.
    pub fn answered(&self, request: &str) -> bool {
        self.answered.contains(request)
    }
}

#[async_trait::async_trait]
impl Concept for Requesting {
    fn name(&self) -> &str {
        "Requesting"
    }

    async fn action(&self, op: &str, input: &FieldMap) -> Reply {
        match op {
            "request" => {
                let id = fresh_id("req");
                Reply::ok([(REQUEST_FIELD, Value::String(id))])
            }
            "respond" => {
                let id = match req_str(input, REQUEST_FIELD) {
                    Ok(id) => id,
                    Err(msg) => return Reply::error(msg),
                };
                if self.answered.insert(id.clone()) {
                    Reply::ok([(REQUEST_FIELD, Value::String(id))])
                } else {
                    Reply::error(format!("Request '{id}' already answered."))
                }
            }
            other => Reply::error(format!("Unknown action '{other}'.")),
        }
    }

    async fn query(&self, op: &str, _input: &FieldMap) -> Rows {
        Rows::error(format!("Unknown query '{op}'."))
    }
}
