//! Login sessions: opaque session ids mapped to user ids.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use crate::concept::{fresh_id, req_str, Concept, Reply, Rows};
use crate::record::FieldMap;

/// Session store. `_getUser` yields zero rows for an unknown session, so
/// rules refining through it simply do not fire for stale or forged ids.
#[derive(Debug, Default)]
pub struct Sessioning {
    /// session id -> user id.
    sessions: DashMap<String, String>,
}

impl Sessioning {
    pub fn new() -> Self {
        Self::default()
    }

    fn create(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let user = req_str(input, "user")?;
        let session = fresh_id("session");
        self.sessions.insert(session.clone(), user);
        let mut out = FieldMap::new();
        out.insert("session".to_string(), Value::String(session));
        Ok(out)
    }

    fn delete(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let session = req_str(input, "session")?;
        if self.sessions.remove(&session).is_none() {
            return Err(format!("Session with id {session} not found"));
        }
        Ok(FieldMap::new())
    }

    fn user_of(&self, input: &FieldMap) -> Rows {
        let session = match req_str(input, "session") {
            Ok(session) => session,
            Err(msg) => return Rows::error(msg),
        };
        match self.sessions.get(&session) {
            Some(entry) => Rows::one([("user", json!(entry.value()))]),
            None => Rows::none(),
        }
    }
}

#[async_trait]
impl Concept for Sessioning {
    fn name(&self) -> &str {
        "Sessioning"
    }

    async fn action(&self, op: &str, input: &FieldMap) -> Reply {
        match op {
            "create" => self.create(input).into(),
            "delete" => self.delete(input).into(),
            other => Reply::error(format!("Unknown action '{other}'.")),
        }
    }

    async fn query(&self, op: &str, input: &FieldMap) -> Rows {
        match op {
            "_getUser" => self.user_of(input),
            _ => Rows::error(format!("Unknown query '{op}'.")),
        }
    }
}
