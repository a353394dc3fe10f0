//! End-to-end tests for the weft engine.
//!
//! These run full request cascades against the complete concept suite
//! and rule set, exactly as the HTTP layer would: one `handle_request`
//! per route, then assertions on the response and the record log.

use std::sync::Arc;

use serde_json::{json, Value};

use weft::concept::ConceptRegistry;
use weft::concepts::{Dictionary, FileTracker, Library, PasswordAuthentication, Sessioning};
use weft::engine::{Engine, DEFAULT_MAX_DEPTH};
use weft::estimate::{HeuristicCompletion, IndexEstimator};
use weft::record::FieldMap;
use weft::requesting::Requesting;
use weft::syncs;

fn test_engine() -> Engine {
    let estimator = Arc::new(IndexEstimator::new(Arc::new(HeuristicCompletion)));
    let registry = ConceptRegistry::new();
    registry.register(Arc::new(Requesting::new())).unwrap();
    registry
        .register(Arc::new(PasswordAuthentication::new()))
        .unwrap();
    registry.register(Arc::new(Sessioning::new())).unwrap();
    registry.register(Arc::new(Library::new())).unwrap();
    registry
        .register(Arc::new(FileTracker::new(estimator)))
        .unwrap();
    registry.register(Arc::new(Dictionary::new())).unwrap();
    Engine::new(registry, syncs::all(), DEFAULT_MAX_DEPTH).unwrap()
}

fn fields(pairs: &[(&str, Value)]) -> FieldMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn request(engine: &Engine, path: &str, pairs: &[(&str, Value)]) -> FieldMap {
    let cascade = engine.handle_request(path, fields(pairs)).await.unwrap();
    let audit = cascade.audit();
    assert!(audit.is_clean(), "{path}: {audit:?}");
    cascade
        .response()
        .unwrap_or_else(|| panic!("{path}: no response"))
}

/// Register a user and log them in, returning the session id.
async fn login(engine: &Engine, username: &str) -> String {
    let body = request(
        engine,
        "/PasswordAuthentication/register",
        &[("username", json!(username)), ("password", json!("pw"))],
    )
    .await;
    assert!(body["user"].is_string());

    let body = request(
        engine,
        "/PasswordAuthentication/authenticate",
        &[("username", json!(username)), ("password", json!("pw"))],
    )
    .await;
    body["session"].as_str().expect("session id").to_string()
}

async fn create_file(engine: &Engine, session: &str) -> String {
    let body = request(
        engine,
        "/Library/createFile",
        &[("session", json!(session))],
    )
    .await;
    body["id"].as_str().expect("file id").to_string()
}

#[tokio::test]
async fn register_login_and_build_a_library() {
    let engine = test_engine();
    let session = login(&engine, "ada").await;

    let body = request(&engine, "/Library/create", &[("session", json!(&session))]).await;
    assert!(body["library"].as_str().unwrap().starts_with("library:"));

    let file = create_file(&engine, &session).await;

    for item in ["cast on", "knit 5", "bind off"] {
        let body = request(
            &engine,
            "/Library/addItemToFile",
            &[
                ("session", json!(&session)),
                ("file", json!(&file)),
                ("item", json!(item)),
            ],
        )
        .await;
        assert!(!body.contains_key("error"), "{body:?}");
    }

    let body = request(
        &engine,
        "/Library/_getFileString",
        &[("session", json!(&session)), ("file", json!(&file))],
    )
    .await;
    assert_eq!(body["fileString"], json!("cast on\nknit 5\nbind off"));

    let body = request(
        &engine,
        "/Library/_getAllFiles",
        &[("session", json!(&session))],
    )
    .await;
    assert_eq!(body["files"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_session_gets_exactly_one_error_response() {
    let engine = test_engine();

    let cascade = engine
        .handle_request(
            "/Library/createFile",
            fields(&[("session", json!("session:bogus"))]),
        )
        .await
        .unwrap();

    assert!(cascade.audit().is_clean());
    let body = cascade.response().unwrap();
    assert_eq!(body["error"], json!("Invalid session"));

    // The guarded action never ran.
    assert!(cascade.records_for("Library.createFile").is_empty());
}

#[tokio::test]
async fn wrong_password_relays_the_concept_error() {
    let engine = test_engine();
    login(&engine, "ada").await;

    let body = request(
        &engine,
        "/PasswordAuthentication/authenticate",
        &[("username", json!("ada")), ("password", json!("nope"))],
    )
    .await;
    assert_eq!(body["error"], json!("Password does not match!"));
}

#[tokio::test]
async fn deleting_a_library_cascades_to_every_file() {
    let engine = test_engine();
    let session = login(&engine, "ada").await;
    request(&engine, "/Library/create", &[("session", json!(&session))]).await;

    for _ in 0..3 {
        create_file(&engine, &session).await;
    }

    let cascade = engine
        .handle_request("/Library/delete", fields(&[("session", json!(&session))]))
        .await
        .unwrap();
    assert!(cascade.audit().is_clean());
    assert_eq!(cascade.response().unwrap()["status"], json!("deleted"));

    // One deleteFile dispatch per file, all successful.
    let deletions = cascade.records_for("Library.deleteFile");
    assert_eq!(deletions.len(), 3);
    assert!(deletions.iter().all(|r| !r.outcome.is_error()));

    // Nothing left: a fresh library sees zero files.
    request(&engine, "/Library/create", &[("session", json!(&session))]).await;
    let body = request(
        &engine,
        "/Library/_getAllFiles",
        &[("session", json!(&session))],
    )
    .await;
    assert_eq!(body["files"], json!([]));
}

#[tokio::test]
async fn deleting_a_file_tears_down_its_tracking() {
    let engine = test_engine();
    let session = login(&engine, "ada").await;
    request(&engine, "/Library/create", &[("session", json!(&session))]).await;
    let file = create_file(&engine, &session).await;

    let body = request(
        &engine,
        "/FileTracker/startTracking",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("maxIndex", json!(5)),
        ],
    )
    .await;
    assert!(body["id"].is_string());

    let cascade = engine
        .handle_request(
            "/Library/deleteFile",
            fields(&[("session", json!(&session)), ("file", json!(&file))]),
        )
        .await
        .unwrap();
    assert!(cascade.audit().is_clean());
    assert_eq!(cascade.response().unwrap()["status"], json!("deleted"));
    let teardown = cascade.records_for("FileTracker.deleteTracking");
    assert_eq!(teardown.len(), 1);
    assert!(!teardown[0].outcome.is_error());

    // The tracking is gone.
    let body = request(
        &engine,
        "/FileTracker/_getCurrentItem",
        &[("session", json!(&session)), ("file", json!(&file))],
    )
    .await;
    assert_eq!(body["error"], json!("No tracking found for this file."));
}

#[tokio::test]
async fn tracker_navigation_over_the_wire() {
    let engine = test_engine();
    let session = login(&engine, "ada").await;
    request(&engine, "/Library/create", &[("session", json!(&session))]).await;
    let file = create_file(&engine, &session).await;

    request(
        &engine,
        "/FileTracker/startTracking",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("maxIndex", json!(4)),
        ],
    )
    .await;

    let nav = |path: &'static str| {
        let session = session.clone();
        let file = file.clone();
        let engine = &engine;
        async move {
            request(
                engine,
                path,
                &[("session", json!(session)), ("file", json!(file))],
            )
            .await
        }
    };

    assert_eq!(nav("/FileTracker/next").await["status"], json!("next in pattern"));
    assert_eq!(nav("/FileTracker/next").await["status"], json!("next in pattern"));
    assert_eq!(nav("/FileTracker/_getCurrentItem").await["index"], json!(3));
    assert_eq!(nav("/FileTracker/back").await["status"], json!("back in pattern"));
    assert_eq!(nav("/FileTracker/_getCurrentItem").await["index"], json!(2));

    let body = request(
        &engine,
        "/FileTracker/jumpTo",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("index", json!(4)),
        ],
    )
    .await;
    assert_eq!(body["status"], json!("jumpedTo"));

    let body = request(
        &engine,
        "/FileTracker/setVisibility",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("visible", json!(false)),
        ],
    )
    .await;
    assert_eq!(body["status"], json!("set visibility"));
    assert_eq!(
        nav("/FileTracker/_getVisibility").await["isVisible"],
        json!(false)
    );
}

#[tokio::test]
async fn llm_assisted_tracking_starts_at_the_estimated_row() {
    let engine = test_engine();
    let session = login(&engine, "ada").await;
    request(&engine, "/Library/create", &[("session", json!(&session))]).await;
    let file = create_file(&engine, &session).await;

    let content = json!(["Notes", "row 1: cast on", "row 2: knit"]).to_string();
    let body = request(
        &engine,
        "/FileTracker/startTrackingUsingLLM",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("fileInput", json!(content)),
            ("fileMaxIndex", json!(2)),
        ],
    )
    .await;
    assert_eq!(body["status"], json!("started file tracking"));
    assert!(body["trackedFileId"].is_string());

    let body = request(
        &engine,
        "/FileTracker/_getCurrentItem",
        &[("session", json!(&session)), ("file", json!(&file))],
    )
    .await;
    assert_eq!(body["index"], json!(1));
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let engine = test_engine();
    let session = login(&engine, "ada").await;

    let body = request(
        &engine,
        "/Sessioning/delete",
        &[("session", json!(&session))],
    )
    .await;
    assert_eq!(body["status"], json!("logged out"));

    let body = request(&engine, "/Library/create", &[("session", json!(&session))]).await;
    assert_eq!(body["error"], json!("Invalid session"));
}

#[tokio::test]
async fn dictionary_routes_run_through_the_engine() {
    let engine = test_engine();

    let term = [
        ("type", json!("language")),
        ("language1", json!("maska")),
        ("language2", json!("stitch")),
    ];

    let body = request(&engine, "/Dictionary/addTerm", &term).await;
    assert_eq!(body["status"], json!("term added"));

    let body = request(&engine, "/Dictionary/addTerm", &term).await;
    assert_eq!(
        body["error"],
        json!("This term pair maska -> stitch already exists.")
    );

    let body = request(&engine, "/Dictionary/deleteTerm", &term).await;
    assert_eq!(body["status"], json!("term deleted"));
}

#[tokio::test]
async fn item_edits_respond_with_the_file_id() {
    let engine = test_engine();
    let session = login(&engine, "ada").await;
    request(&engine, "/Library/create", &[("session", json!(&session))]).await;
    let file = create_file(&engine, &session).await;

    request(
        &engine,
        "/Library/addItemToFile",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("item", json!("knit 5")),
        ],
    )
    .await;

    let body = request(
        &engine,
        "/Library/modifyItemInFile",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("index", json!(0)),
            ("newItem", json!("purl 5")),
        ],
    )
    .await;
    assert_eq!(body["file"], json!(&file));

    let body = request(
        &engine,
        "/Library/removeItemFromFile",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("index", json!(5)),
        ],
    )
    .await;
    assert_eq!(body["error"], json!("Index '5' is out of bounds."));

    let body = request(
        &engine,
        "/Library/setImageToFile",
        &[
            ("session", json!(&session)),
            ("file", json!(&file)),
            ("image", json!("https://example.net/chart.png")),
        ],
    )
    .await;
    assert_eq!(body["status"], json!("image_set"));

    let body = request(
        &engine,
        "/Library/clearImageFromFile",
        &[("session", json!(&session)), ("file", json!(&file))],
    )
    .await;
    assert_eq!(body["status"], json!("image_cleared"));
}

#[tokio::test]
async fn unknown_file_id_still_gets_an_answer() {
    let engine = test_engine();
    let session = login(&engine, "iris").await;

    let body = request(
        &engine,
        "/Library/_getFileString",
        &[("session", json!(&session)), ("file", json!("file:deadbeef"))],
    )
    .await;
    assert_eq!(body["error"], json!("No file found with that id."));
}
