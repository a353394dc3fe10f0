//! Per-user position tracking within files.
//!
//! One tracking per (owner, file), holding a bounds-checked current index
//! and a visibility flag. `startTrackingUsingLLM` delegates the starting
//! index to the crate's [`IndexEstimator`] instead of defaulting to the
//! top of the file.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use crate::concept::{fresh_id, req_bool, req_i64, req_str, Concept, Reply, Rows};
use crate::estimate::IndexEstimator;
use crate::record::FieldMap;

#[derive(Debug, Clone)]
struct Tracking {
    current_index: i64,
    max_index: i64,
    visible: bool,
}

pub struct FileTracker {
    /// (owner, file) -> tracking.
    trackings: DashMap<(String, String), Tracking>,
    estimator: Arc<IndexEstimator>,
}

impl FileTracker {
    pub fn new(estimator: Arc<IndexEstimator>) -> Self {
        Self {
            trackings: DashMap::new(),
            estimator,
        }
    }

    fn key(input: &FieldMap) -> Result<(String, String), String> {
        Ok((req_str(input, "owner")?, req_str(input, "file")?))
    }

    fn missing(owner: &str, file: &str) -> String {
        format!("No tracking found for owner '{owner}' and file '{file}'.")
    }

    fn start_tracking(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let key = Self::key(input)?;
        let max_index = req_i64(input, "maxIndex")?;
        if max_index <= 0 {
            return Err(format!(
                "Invalid maxIndex: {max_index}. Must be a non-negative integer."
            ));
        }
        if self.trackings.contains_key(&key) {
            return Err(format!(
                "Tracking already exists for owner '{}' and file '{}'.",
                key.0, key.1
            ));
        }
        let id = fresh_id("tracking");
        self.trackings.insert(
            key,
            Tracking {
                current_index: 1,
                max_index,
                visible: true,
            },
        );
        let mut out = FieldMap::new();
        out.insert("id".to_string(), Value::String(id));
        Ok(out)
    }

    fn delete_tracking(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let key = Self::key(input)?;
        if self.trackings.remove(&key).is_none() {
            return Err(Self::missing(&key.0, &key.1));
        }
        Ok(FieldMap::new())
    }

    fn with_tracking<T>(
        &self,
        input: &FieldMap,
        f: impl FnOnce(&mut Tracking) -> Result<T, String>,
    ) -> Result<T, String> {
        let key = Self::key(input)?;
        match self.trackings.get_mut(&key) {
            Some(mut entry) => f(entry.value_mut()),
            None => Err(Self::missing(&key.0, &key.1)),
        }
    }

    fn jump_to(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let index = req_i64(input, "index")?;
        self.with_tracking(input, |t| {
            if index < 0 || index > t.max_index {
                return Err(format!(
                    "Index '{index}' is out of bounds [0, {}] or not an integer.",
                    t.max_index
                ));
            }
            t.current_index = index;
            Ok(FieldMap::new())
        })
    }

    fn next(&self, input: &FieldMap) -> Result<FieldMap, String> {
        self.with_tracking(input, |t| {
            if t.current_index >= t.max_index {
                return Err(format!(
                    "Current index {} is already at or beyond max index {}. Cannot move next.",
                    t.current_index, t.max_index
                ));
            }
            t.current_index += 1;
            Ok(FieldMap::new())
        })
    }

    fn back(&self, input: &FieldMap) -> Result<FieldMap, String> {
        self.with_tracking(input, |t| {
            if t.current_index <= 1 {
                return Err(format!(
                    "Current index {} is already at or below 1. Cannot move back.",
                    t.current_index
                ));
            }
            t.current_index -= 1;
            Ok(FieldMap::new())
        })
    }

    fn set_visibility(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let visible = req_bool(input, "visible")?;
        self.with_tracking(input, |t| {
            t.visible = visible;
            Ok(FieldMap::new())
        })
    }

    async fn start_tracking_with_estimator(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let key = Self::key(input)?;
        let file_input = req_str(input, "fileInput")?;
        let file_max_index = req_i64(input, "fileMaxIndex")?;

        if self.trackings.contains_key(&key) {
            return Err(format!(
                "Tracking already exists for owner '{}' and file '{}'.",
                key.0, key.1
            ));
        }

        let parsed: Value = serde_json::from_str(&file_input).map_err(|e| {
            format!("Invalid fileContentString: Must be a valid JSON stringified array. Error: {e}")
        })?;
        let lines: Vec<String> = match parsed.as_array() {
            Some(array) if array.iter().all(Value::is_string) => array
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => {
                return Err(
                    "fileContentString must be a JSON stringified array of strings.".to_string(),
                )
            }
        };
        if lines.is_empty() && file_max_index != -1 {
            return Err(format!(
                "maxIndex {file_max_index} is inconsistent with empty file content."
            ));
        }
        if !lines.is_empty() && file_max_index != lines.len() as i64 - 1 {
            return Err(format!(
                "maxIndex {file_max_index} is inconsistent with file content length {} (expected {}).",
                lines.len(),
                lines.len() - 1
            ));
        }

        let current_index = self
            .estimator
            .estimate(&lines, file_max_index)
            .await
            .map_err(|e| format!("Failed to start tracking with LLM: {e}"))?;

        let id = fresh_id("tracking");
        self.trackings.insert(
            key,
            Tracking {
                current_index,
                max_index: file_max_index,
                visible: true,
            },
        );
        let mut out = FieldMap::new();
        out.insert("id".to_string(), Value::String(id));
        Ok(out)
    }

    fn current_item(&self, input: &FieldMap) -> Rows {
        let key = match Self::key(input) {
            Ok(key) => key,
            Err(msg) => return Rows::error(msg),
        };
        match self.trackings.get(&key) {
            Some(t) => Rows::one([("index", json!(t.value().current_index))]),
            None => Rows::none(),
        }
    }

    fn visibility(&self, input: &FieldMap) -> Rows {
        let key = match Self::key(input) {
            Ok(key) => key,
            Err(msg) => return Rows::error(msg),
        };
        match self.trackings.get(&key) {
            Some(t) => Rows::one([("isVisible", json!(t.value().visible))]),
            None => Rows::none(),
        }
    }
}

impl std::fmt::Debug for FileTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTracker")
            .field("trackings", &self.trackings.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Concept for FileTracker {
    fn name(&self) -> &str {
        "FileTracker"
    }

    async fn action(&self, op: &str, input: &FieldMap) -> Reply {
        match op {
            "startTracking" => self.start_tracking(input).into(),
            "deleteTracking" => self.delete_tracking(input).into(),
            "jumpTo" => self.jump_to(input).into(),
            "next" => self.next(input).into(),
            "back" => self.back(input).into(),
            "setVisibility" => self.set_visibility(input).into(),
            "startTrackingUsingLLM" => self.start_tracking_with_estimator(input).await.into(),
            other => Reply::error(format!("Unknown action '{other}'.")),
        }
    }

    async fn query(&self, op: &str, input: &FieldMap) -> Rows {
        match op {
            "_getCurrentItem" => self.current_item(input),
            "_getVisibility" => self.visibility(input),
            other => Rows::error(format!("Unknown query '{other}'.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::HeuristicCompletion;

    fn tracker() -> FileTracker {
        FileTracker::new(Arc::new(IndexEstimator::new(Arc::new(HeuristicCompletion))))
    }

    fn wire(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn start_input(max: i64) -> FieldMap {
        wire(&[
            ("owner", json!("alice")),
            ("file", json!("f1")),
            ("maxIndex", json!(max)),
        ])
    }

    fn nav_input() -> FieldMap {
        wire(&[("owner", json!("alice")), ("file", json!("f1"))])
    }

    #[tokio::test]
    async fn start_then_navigate_within_bounds() {
        let t = tracker();
        assert!(!t.action("startTracking", &start_input(3)).await.is_error());

        // currentIndex starts at 1; two nexts reach maxIndex, a third fails.
        assert!(!t.action("next", &nav_input()).await.is_error());
        assert!(!t.action("next", &nav_input()).await.is_error());
        assert!(t.action("next", &nav_input()).await.is_error());

        match t.query("_getCurrentItem", &nav_input()).await {
            Rows::Rows(rows) => assert_eq!(rows[0]["index"], json!(3)),
            Rows::Error(msg) => panic!("unexpected error: {msg}"),
        }

        assert!(!t.action("back", &nav_input()).await.is_error());
        assert!(!t.action("back", &nav_input()).await.is_error());
        // Back below 1 is refused.
        assert!(t.action("back", &nav_input()).await.is_error());
    }

    #[tokio::test]
    async fn duplicate_tracking_and_bad_max_index_rejected() {
        let t = tracker();
        assert_eq!(
            t.action("startTracking", &start_input(0)).await,
            Reply::error("Invalid maxIndex: 0. Must be a non-negative integer.")
        );
        assert!(!t.action("startTracking", &start_input(5)).await.is_error());
        assert_eq!(
            t.action("startTracking", &start_input(5)).await,
            Reply::error("Tracking already exists for owner 'alice' and file 'f1'.")
        );
    }

    #[tokio::test]
    async fn jump_to_is_bounds_checked() {
        let t = tracker();
        t.action("startTracking", &start_input(5)).await;
        let mut input = nav_input();
        input.insert("index".to_string(), json!(4));
        assert!(!t.action("jumpTo", &input).await.is_error());

        input.insert("index".to_string(), json!(6));
        assert_eq!(
            t.action("jumpTo", &input).await,
            Reply::error("Index '6' is out of bounds [0, 5] or not an integer.")
        );
    }

    #[tokio::test]
    async fn visibility_round_trip() {
        let t = tracker();
        t.action("startTracking", &start_input(2)).await;
        let mut input = nav_input();
        input.insert("visible".to_string(), json!(false));
        assert!(!t.action("setVisibility", &input).await.is_error());
        match t.query("_getVisibility", &nav_input()).await {
            Rows::Rows(rows) => assert_eq!(rows[0]["isVisible"], json!(false)),
            Rows::Error(msg) => panic!("unexpected error: {msg}"),
        }
    }

    #[tokio::test]
    async fn estimator_backed_start_uses_estimated_index() {
        let t = tracker();
        let lines = json!(["Pattern", "Materials", "yarn", "1. ch 10"]);
        let input = wire(&[
            ("owner", json!("alice")),
            ("file", json!("f1")),
            ("fileInput", json!(lines.to_string())),
            ("fileMaxIndex", json!(3)),
        ]);
        assert!(!t.action("startTrackingUsingLLM", &input).await.is_error());
        match t.query("_getCurrentItem", &nav_input()).await {
            Rows::Rows(rows) => assert_eq!(rows[0]["index"], json!(3)),
            Rows::Error(msg) => panic!("unexpected error: {msg}"),
        }
    }

    #[tokio::test]
    async fn estimator_input_validation() {
        let t = tracker();
        let base = |file_input: &str, max: i64| {
            wire(&[
                ("owner", json!("alice")),
                ("file", json!("f2")),
                ("fileInput", json!(file_input)),
                ("fileMaxIndex", json!(max)),
            ])
        };

        let not_json = t.action("startTrackingUsingLLM", &base("not json", 0)).await;
        assert!(not_json.is_error());

        let not_strings = t
            .action("startTrackingUsingLLM", &base("[1, 2]", 1))
            .await;
        assert_eq!(
            not_strings,
            Reply::error("fileContentString must be a JSON stringified array of strings.")
        );

        let inconsistent = t
            .action("startTrackingUsingLLM", &base("[\"a\", \"b\"]", 5))
            .await;
        assert_eq!(
            inconsistent,
            Reply::error("maxIndex 5 is inconsistent with file content length 2 (expected 1).")
        );
    }
}
