//! Dictionary maintenance rules. Term additions and deletions route
//! through the engine; lookups are served as passthrough routes and
//! never reach a rule.

use crate::rule::{lit, var, Rule};

use super::{error_response, status_response};

pub fn rules() -> Vec<Rule> {
    vec![
        Rule::on("AddTermRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Dictionary/addTerm")),
                    ("type", var("type")),
                    ("language1", var("language1")),
                    ("language2", var("language2")),
                ],
                [("request", var("request"))],
            )
            .then(
                "Dictionary.addTerm",
                [
                    ("type", var("type")),
                    ("language1", var("language1")),
                    ("language2", var("language2")),
                ],
            )
            .build(),
        status_response(
            "AddTermResponse",
            "/Dictionary/addTerm",
            "Dictionary.addTerm",
            "term added",
        ),
        error_response(
            "AddTermResponseError",
            "/Dictionary/addTerm",
            "Dictionary.addTerm",
        ),
        Rule::on("DeleteTermRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Dictionary/deleteTerm")),
                    ("type", var("type")),
                    ("language1", var("language1")),
                    ("language2", var("language2")),
                ],
                [("request", var("request"))],
            )
            .then(
                "Dictionary.deleteTerm",
                [
                    ("type", var("type")),
                    ("language1", var("language1")),
                    ("language2", var("language2")),
                ],
            )
            .build(),
        status_response(
            "DeleteTermResponse",
            "/Dictionary/deleteTerm",
            "Dictionary.deleteTerm",
            "term deleted",
        ),
        error_response(
            "DeleteTermResponseError",
            "/Dictionary/deleteTerm",
            "Dictionary.deleteTerm",
        ),
    ]
}
