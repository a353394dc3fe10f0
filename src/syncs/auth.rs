//! Account and session rules: register, login, logout.
//!
//! Login is a two-hop cascade: the authenticate action fires a rule that
//! creates a session, and the session creation fires the rule that
//! answers the request.

use crate::rule::{lit, var, Rule, NO_FIELDS};

use super::error_response;

pub fn rules() -> Vec<Rule> {
    vec![
        // --- register ---
        Rule::on("RegisterRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/PasswordAuthentication/register")),
                    ("username", var("username")),
                    ("password", var("password")),
                ],
                [("request", var("request"))],
            )
            .then(
                "PasswordAuthentication.register",
                [("username", var("username")), ("password", var("password"))],
            )
            .build(),
        Rule::on("RegisterResponse")
            .when(
                "Requesting.request",
                [("path", lit("/PasswordAuthentication/register"))],
                [("request", var("request"))],
            )
            .when(
                "PasswordAuthentication.register",
                NO_FIELDS,
                [("user", var("user"))],
            )
            .then(
                "Requesting.respond",
                [("request", var("request")), ("user", var("user"))],
            )
            .build(),
        error_response(
            "RegisterResponseError",
            "/PasswordAuthentication/register",
            "PasswordAuthentication.register",
        ),
        // --- login ---
        Rule::on("LoginRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/PasswordAuthentication/authenticate")),
                    ("username", var("username")),
                    ("password", var("password")),
                ],
                [("request", var("request"))],
            )
            .then(
                "PasswordAuthentication.authenticate",
                [("username", var("username")), ("password", var("password"))],
            )
            .build(),
        Rule::on("LoginSession")
            .when(
                "Requesting.request",
                [("path", lit("/PasswordAuthentication/authenticate"))],
                [("request", var("request"))],
            )
            .when(
                "PasswordAuthentication.authenticate",
                NO_FIELDS,
                [("user", var("user"))],
            )
            .then("Sessioning.create", [("user", var("user"))])
            .build(),
        Rule::on("LoginResponse")
            .when(
                "Requesting.request",
                [("path", lit("/PasswordAuthentication/authenticate"))],
                [("request", var("request"))],
            )
            .when("Sessioning.create", NO_FIELDS, [("session", var("session"))])
            .then(
                "Requesting.respond",
                [("request", var("request")), ("session", var("session"))],
            )
            .build(),
        error_response(
            "LoginResponseError",
            "/PasswordAuthentication/authenticate",
            "PasswordAuthentication.authenticate",
        ),
        // --- logout ---
        Rule::on("LogoutRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Sessioning/delete")),
                    ("session", var("session")),
                ],
                [("request", var("request"))],
            )
            .then("Sessioning.delete", [("session", var("session"))])
            .build(),
        Rule::on("LogoutResponse")
            .when(
                "Requesting.request",
                [("path", lit("/Sessioning/delete"))],
                [("request", var("request"))],
            )
            .when("Sessioning.delete", NO_FIELDS, NO_FIELDS)
            .then(
                "Requesting.respond",
                [("request", var("request")), ("status", lit("logged out"))],
            )
            .build(),
        error_response(
            "LogoutResponseError",
            "/Sessioning/delete",
            "Sessioning.delete",
        ),
    ]
}
