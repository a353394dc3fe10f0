//! Bidirectional term translation between two languages.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use crate::concept::{fresh_id, req_str, Concept, Reply, Rows};
use crate::record::FieldMap;

/// Allowed term kinds.
const KINDS: &[&str] = &["language", "abbreviation"];

#[derive(Debug, Clone, PartialEq)]
struct Term {
    kind: String,
    language1: String,
    language2: String,
}

/// A set of term pairs; lookups and duplicate checks are case-insensitive.
#[derive(Debug, Default)]
pub struct Dictionary {
    terms: DashMap<String, Term>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, pred: impl Fn(&Term) -> bool) -> Option<(String, Term)> {
        self.terms
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
    }

    fn add_term(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let kind_raw = req_str(input, "type")?;
        let kind = kind_raw.to_lowercase();
        if !KINDS.contains(&kind.as_str()) {
            return Err(format!(
                "Invalid term type \"{kind_raw}\". Allowed: \"language\" | \"abbreviation\"."
            ));
        }
        let language1 = req_str(input, "language1")?.to_lowercase();
        let language2 = req_str(input, "language2")?.to_lowercase();

        if self
            .find(|t| t.kind == kind && t.language1 == language1 && t.language2 == language2)
            .is_some()
        {
            return Err(format!(
                "This term pair {language1} -> {language2} already exists."
            ));
        }

        let id = fresh_id("term");
        self.terms.insert(
            id.clone(),
            Term {
                kind,
                language1,
                language2,
            },
        );
        let mut out = FieldMap::new();
        out.insert("id".to_string(), Value::String(id));
        Ok(out)
    }

    fn delete_term(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let kind_raw = req_str(input, "type")?;
        let kind = kind_raw.to_lowercase();
        let language1 = req_str(input, "language1")?.to_lowercase();
        let language2 = req_str(input, "language2")?.to_lowercase();

        let Some((id, _)) =
            self.find(|t| t.kind == kind && t.language1 == language1 && t.language2 == language2)
        else {
            return Err(format!(
                "Term pair with type \"{kind_raw}\", \"{language1}\" -> \"{language2}\" not found."
            ));
        };
        self.terms.remove(&id);
        Ok(FieldMap::new())
    }

    fn translate_from_l1(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let kind_raw = req_str(input, "type")?;
        let kind = kind_raw.to_lowercase();
        let language1 = req_str(input, "language1")?.to_lowercase();

        let Some((_, term)) = self.find(|t| t.kind == kind && t.language1 == language1) else {
            return Err(format!(
                "Translation for type \"{kind_raw}\", \"{language1}\" not found."
            ));
        };
        let mut out = FieldMap::new();
        out.insert("language2".to_string(), json!(term.language2));
        Ok(out)
    }

    fn translate_from_l2(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let kind_raw = req_str(input, "type")?;
        let kind = kind_raw.to_lowercase();
        let language2 = req_str(input, "language2")?.to_lowercase();

        let Some((_, term)) = self.find(|t| t.kind == kind && t.language2 == language2) else {
            return Err(format!(
                "Translation for type \"{kind_raw}\", \"{language2}\" not found."
            ));
        };
        let mut out = FieldMap::new();
        out.insert("language1".to_string(), json!(term.language1));
        Ok(out)
    }
}

#[async_trait]
impl Concept for Dictionary {
    fn name(&self) -> &str {
        "Dictionary"
    }

    async fn action(&self, op: &str, input: &FieldMap) -> Reply {
        match op {
            "addTerm" => self.add_term(input).into(),
            "deleteTerm" => self.delete_term(input).into(),
            "translateTermFromL1" => self.translate_from_l1(input).into(),
            "translateTermFromL2" => self.translate_from_l2(input).into(),
            other => Reply::error(format!("Unknown action '{other}'.")),
        }
    }

    async fn query(&self, op: &str, _input: &FieldMap) -> Rows {
        Rows::error(format!("Unknown query '{op}'."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn add_translate_both_directions() {
        let dict = Dictionary::new();
        let added = dict
            .action(
                "addTerm",
                &wire(&[("type", "language"), ("language1", "hello"), ("language2", "hola")]),
            )
            .await;
        assert!(!added.is_error());

        let l2 = dict
            .action(
                "translateTermFromL1",
                &wire(&[("type", "language"), ("language1", "HELLO")]),
            )
            .await;
        assert_eq!(l2, Reply::ok([("language2", json!("hola"))]));

        let l1 = dict
            .action(
                "translateTermFromL2",
                &wire(&[("type", "language"), ("language2", "hola")]),
            )
            .await;
        assert_eq!(l1, Reply::ok([("language1", json!("hello"))]));
    }

    #[tokio::test]
    async fn duplicate_pair_rejected_case_insensitively() {
        let dict = Dictionary::new();
        let input = wire(&[("type", "language"), ("language1", "Cat"), ("language2", "Gato")]);
        assert!(!dict.action("addTerm", &input).await.is_error());

        let again = dict
            .action(
                "addTerm",
                &wire(&[("type", "LANGUAGE"), ("language1", "cat"), ("language2", "GATO")]),
            )
            .await;
        assert_eq!(
            again,
            Reply::error("This term pair cat -> gato already exists.")
        );
    }

    #[tokio::test]
    async fn invalid_kind_rejected() {
        let dict = Dictionary::new();
        let reply = dict
            .action(
                "addTerm",
                &wire(&[("type", "slang"), ("language1", "a"), ("language2", "b")]),
            )
            .await;
        assert_eq!(
            reply,
            Reply::error("Invalid term type \"slang\". Allowed: \"language\" | \"abbreviation\".")
        );
    }

    #[tokio::test]
    async fn delete_then_lookup_misses() {
        let dict = Dictionary::new();
        let input = wire(&[
            ("type", "abbreviation"),
            ("language1", "sc"),
            ("language2", "single crochet"),
        ]);
        assert!(!dict.action("addTerm", &input).await.is_error());
        assert!(!dict.action("deleteTerm", &input).await.is_error());

        let missing = dict.action("deleteTerm", &input).await;
        assert_eq!(
            missing,
            Reply::error(
                "Term pair with type \"abbreviation\", \"sc\" -> \"single crochet\" not found."
            )
        );
        let lookup = dict
            .action(
                "translateTermFromL1",
                &wire(&[("type", "abbreviation"), ("language1", "sc")]),
            )
            .await;
        assert!(lookup.is_error());
    }
}
