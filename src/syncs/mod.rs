//! The rule (sync) definitions wiring routes to concepts.
//!
//! Every engine-routed HTTP route is covered by a family of rules: a
//! request rule (session-guarded where the route needs a logged-in user),
//! a success-response rule, an error-response rule, and — for guarded
//! routes — an auth-error rule that answers with `Invalid session` when
//! the session lookup finds nothing. Between them, every request gets
//! exactly one respond.

use crate::rule::{lit, var, Rule, NO_FIELDS};

pub mod auth;
pub mod dictionary;
pub mod file_tracker;
pub mod library;

/// All rules, in registration order.
pub fn all() -> Vec<Rule> {
    let mut rules = Vec::new();
    rules.extend(auth::rules());
    rules.extend(dictionary::rules());
    rules.extend(library::rules());
    rules.extend(file_tracker::rules());
    rules
}

/// The auth-error rule for a session-guarded route: when the session
/// resolves to no user, answer the request instead of leaving it hanging.
fn invalid_session(name: &str, path: &str) -> Rule {
    Rule::on(name)
        .when(
            "Requesting.request",
            [("path", lit(path)), ("session", var("session"))],
            [("request", var("request"))],
        )
        .guard_absent("Sessioning._getUser", [("session", var("session"))])
        .then(
            "Requesting.respond",
            [("request", var("request")), ("error", lit("Invalid session"))],
        )
        .build()
}

/// The error-response rule: relay an operation's error payload to the
/// request that caused it.
fn error_response(name: &str, path: &str, op: &str) -> Rule {
    Rule::on(name)
        .when(
            "Requesting.request",
            [("path", lit(path))],
            [("request", var("request"))],
        )
        .when(op, NO_FIELDS, [("error", var("error"))])
        .then(
            "Requesting.respond",
            [("request", var("request")), ("error", var("error"))],
        )
        .build()
}

/// The fixed-status success-response rule for operations with no output
/// worth echoing.
fn status_response(name: &str, path: &str, op: &str, status: &str) -> Rule {
    Rule::on(name)
        .when(
            "Requesting.request",
            [("path", lit(path))],
            [("request", var("request"))],
        )
        .when(op, NO_FIELDS, NO_FIELDS)
        .then(
            "Requesting.respond",
            [("request", var("request")), ("status", lit(status))],
        )
        .build()
}
