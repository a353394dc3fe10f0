//! File-tracker rules: start/stop tracking, position moves, visibility,
//! and the two read routes.

use crate::rule::{lit, var, Rule, NO_FIELDS};

use super::{error_response, invalid_session, status_response};

pub fn rules() -> Vec<Rule> {
    vec![
        // --- startTracking ---
        Rule::on("StartTrackingRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/startTracking")),
                    ("session", var("session")),
                    ("file", var("file")),
                    ("maxIndex", var("maxIndex")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "FileTracker.startTracking",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("maxIndex", var("maxIndex")),
                ],
            )
            .build(),
        Rule::on("StartTrackingResponse")
            .when(
                "Requesting.request",
                [("path", lit("/FileTracker/startTracking"))],
                [("request", var("request"))],
            )
            .when("FileTracker.startTracking", NO_FIELDS, [("id", var("id"))])
            .then(
                "Requesting.respond",
                [("request", var("request")), ("id", var("id"))],
            )
            .build(),
        error_response(
            "StartTrackingResponseError",
            "/FileTracker/startTracking",
            "FileTracker.startTracking",
        ),
        invalid_session("StartTrackingAuthError", "/FileTracker/startTracking"),
        // --- startTrackingUsingLLM ---
        Rule::on("StartTrackingLlmRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/startTrackingUsingLLM")),
                    ("session", var("session")),
                    ("file", var("file")),
                    ("fileInput", var("fileInput")),
                    ("fileMaxIndex", var("fileMaxIndex")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "FileTracker.startTrackingUsingLLM",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("fileInput", var("fileInput")),
                    ("fileMaxIndex", var("fileMaxIndex")),
                ],
            )
            .build(),
        Rule::on("StartTrackingLlmResponse")
            .when(
                "Requesting.request",
                [("path", lit("/FileTracker/startTrackingUsingLLM"))],
                [("request", var("request"))],
            )
            .when(
                "FileTracker.startTrackingUsingLLM",
                NO_FIELDS,
                [("id", var("trackedFileId"))],
            )
            .then(
                "Requesting.respond",
                [
                    ("request", var("request")),
                    ("trackedFileId", var("trackedFileId")),
                    ("status", lit("started file tracking")),
                ],
            )
            .build(),
        error_response(
            "StartTrackingLlmResponseError",
            "/FileTracker/startTrackingUsingLLM",
            "FileTracker.startTrackingUsingLLM",
        ),
        invalid_session(
            "StartTrackingLlmAuthError",
            "/FileTracker/startTrackingUsingLLM",
        ),
        // --- deleteTracking ---
        Rule::on("DeleteTrackingRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/deleteTracking")),
                    ("session", var("session")),
                    ("file", var("file")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "FileTracker.deleteTracking",
                [("owner", var("user")), ("file", var("file"))],
            )
            .build(),
        status_response(
            "DeleteTrackingResponse",
            "/FileTracker/deleteTracking",
            "FileTracker.deleteTracking",
            "deleted tracking",
        ),
        error_response(
            "DeleteTrackingResponseError",
            "/FileTracker/deleteTracking",
            "FileTracker.deleteTracking",
        ),
        invalid_session("DeleteTrackingAuthError", "/FileTracker/deleteTracking"),
        // --- jumpTo ---
        Rule::on("JumpToRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/jumpTo")),
                    ("session", var("session")),
                    ("file", var("file")),
                    ("index", var("index")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "FileTracker.jumpTo",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("index", var("index")),
                ],
            )
            .build(),
        status_response(
            "JumpToResponse",
            "/FileTracker/jumpTo",
            "FileTracker.jumpTo",
            "jumpedTo",
        ),
        error_response("JumpToResponseError", "/FileTracker/jumpTo", "FileTracker.jumpTo"),
        invalid_session("JumpToAuthError", "/FileTracker/jumpTo"),
        // --- next ---
        Rule::on("NextRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/next")),
                    ("session", var("session")),
                    ("file", var("file")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "FileTracker.next",
                [("owner", var("user")), ("file", var("file"))],
            )
            .build(),
        status_response(
            "NextResponse",
            "/FileTracker/next",
            "FileTracker.next",
            "next in pattern",
        ),
        error_response("NextResponseError", "/FileTracker/next", "FileTracker.next"),
        invalid_session("NextAuthError", "/FileTracker/next"),
        // --- back ---
        Rule::on("BackRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/back")),
                    ("session", var("session")),
                    ("file", var("file")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "FileTracker.back",
                [("owner", var("user")), ("file", var("file"))],
            )
            .build(),
        status_response(
            "BackResponse",
            "/FileTracker/back",
            "FileTracker.back",
            "back in pattern",
        ),
        error_response("BackResponseError", "/FileTracker/back", "FileTracker.back"),
        invalid_session("BackAuthError", "/FileTracker/back"),
        // --- setVisibility ---
        Rule::on("SetVisibilityRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/setVisibility")),
                    ("session", var("session")),
                    ("file", var("file")),
                    ("visible", var("visible")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "FileTracker.setVisibility",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("visible", var("visible")),
                ],
            )
            .build(),
        status_response(
            "SetVisibilityResponse",
            "/FileTracker/setVisibility",
            "FileTracker.setVisibility",
            "set visibility",
        ),
        error_response(
            "SetVisibilityResponseError",
            "/FileTracker/setVisibility",
            "FileTracker.setVisibility",
        ),
        invalid_session("SetVisibilityAuthError", "/FileTracker/setVisibility"),
        // --- read routes ---
        Rule::on("GetVisibilityRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/_getVisibility")),
                    ("session", var("session")),
                    ("file", var("file")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .query(
                "FileTracker._getVisibility",
                [("owner", var("user")), ("file", var("file"))],
                [("isVisible", "isVisible")],
            )
            .then(
                "Requesting.respond",
                [("request", var("request")), ("isVisible", var("isVisible"))],
            )
            .build(),
        Rule::on("GetVisibilityMissing")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/_getVisibility")),
                    ("session", var("session")),
                    ("file", var("file")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .guard_absent(
                "FileTracker._getVisibility",
                [("owner", var("user")), ("file", var("file"))],
            )
            .then(
                "Requesting.respond",
                [
                    ("request", var("request")),
                    ("error", lit("No tracking found for this file.")),
                ],
            )
            .build(),
        invalid_session("GetVisibilityAuthError", "/FileTracker/_getVisibility"),
        Rule::on("GetCurrentItemRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/_getCurrentItem")),
                    ("session", var("session")),
                    ("file", var("file")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .query(
                "FileTracker._getCurrentItem",
                [("owner", var("user")), ("file", var("file"))],
                [("index", "index")],
            )
            .then(
                "Requesting.respond",
                [("request", var("request")), ("index", var("index"))],
            )
            .build(),
        Rule::on("GetCurrentItemMissing")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/FileTracker/_getCurrentItem")),
                    ("session", var("session")),
                    ("file", var("file")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .guard_absent(
                "FileTracker._getCurrentItem",
                [("owner", var("user")), ("file", var("file"))],
            )
            .then(
                "Requesting.respond",
                [
                    ("request", var("request")),
                    ("error", lit("No tracking found for this file.")),
                ],
            )
            .build(),
        invalid_session("GetCurrentItemAuthError", "/FileTracker/_getCurrentItem"),
    ]
}
