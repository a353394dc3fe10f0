//! Per-user file libraries: a library per owner, files made of string items.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use crate::concept::{fresh_id, req_i64, req_str, Concept, Reply, Rows};
use crate::record::FieldMap;

#[derive(Debug, Clone, PartialEq)]
struct FileEntry {
    owner: String,
    items: Vec<String>,
    image: Option<String>,
}

/// One library per owner; deleting the library leaves its files behind for
/// the deletion-cascade rule to clean up file by file.
#[derive(Debug, Default)]
pub struct Library {
    /// owner -> library id.
    libraries: DashMap<String, String>,
    /// file id -> file.
    files: DashMap<String, FileEntry>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    fn require_library(&self, owner: &str) -> Result<(), String> {
        if self.libraries.contains_key(owner) {
            Ok(())
        } else {
            Err(format!("No library found for owner '{owner}'."))
        }
    }

    /// Mutable access to an owner's file, with ownership enforced. File
    /// operations survive library deletion so the deletion cascade can
    /// still see and remove the orphaned files.
    fn with_file<T>(
        &self,
        owner: &str,
        file: &str,
        f: impl FnOnce(&mut FileEntry) -> Result<T, String>,
    ) -> Result<T, String> {
        match self.files.get_mut(file) {
            Some(mut entry) if entry.owner == owner => f(entry.value_mut()),
            _ => Err(format!("No file '{file}' found for owner '{owner}'.")),
        }
    }

    fn items_of(input: &FieldMap) -> Result<Vec<String>, String> {
        let raw = input
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| "Missing or non-array field 'items'.".to_string())?;
        raw.iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| "Field 'items' must be an array of strings.".to_string())
            })
            .collect()
    }

    fn create(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        if self.libraries.contains_key(&owner) {
            return Err(format!("Library already exists for owner '{owner}'."));
        }
        let library = fresh_id("library");
        self.libraries.insert(owner, library.clone());
        let mut out = FieldMap::new();
        out.insert("library".to_string(), Value::String(library));
        Ok(out)
    }

    fn delete(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        if self.libraries.remove(&owner).is_none() {
            return Err(format!("No library found for owner '{owner}'."));
        }
        Ok(FieldMap::new())
    }

    fn create_file(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        self.require_library(&owner)?;
        let id = fresh_id("file");
        self.files.insert(
            id.clone(),
            FileEntry {
                owner,
                items: Vec::new(),
                image: None,
            },
        );
        let mut out = FieldMap::new();
        out.insert("id".to_string(), Value::String(id));
        Ok(out)
    }

    fn add_file(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        self.require_library(&owner)?;
        let items = Self::items_of(input)?;
        let duplicate = self
            .files
            .iter()
            .any(|e| e.value().owner == owner && e.value().items == items);
        if duplicate {
            return Err("An identical file already exists in the library.".to_string());
        }
        let id = fresh_id("file");
        self.files.insert(
            id.clone(),
            FileEntry {
                owner,
                items,
                image: None,
            },
        );
        let mut out = FieldMap::new();
        out.insert("id".to_string(), Value::String(id));
        Ok(out)
    }

    fn modify_file(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        let file = req_str(input, "file")?;
        let items = Self::items_of(input)?;
        self.with_file(&owner, &file, |entry| {
            entry.items = items;
            Ok(())
        })?;
        let mut out = FieldMap::new();
        out.insert("id".to_string(), Value::String(file));
        Ok(out)
    }

    fn delete_file(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        let file = req_str(input, "file")?;
        let owned = self
            .files
            .get(&file)
            .is_some_and(|e| e.value().owner == owner);
        if !owned {
            return Err(format!("No file '{file}' found for owner '{owner}'."));
        }
        self.files.remove(&file);
        Ok(FieldMap::new())
    }

    fn add_item(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        let file = req_str(input, "file")?;
        let item = req_str(input, "item")?;
        self.with_file(&owner, &file, |entry| {
            entry.items.push(item);
            Ok(FieldMap::new())
        })
    }

    fn modify_item(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        let file = req_str(input, "file")?;
        let index = req_i64(input, "index")?;
        let new_item = req_str(input, "newItem")?;
        self.with_file(&owner, &file, |entry| {
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| entry.items.get_mut(i))
                .ok_or_else(|| format!("Index '{index}' is out of bounds."))?;
            *slot = new_item;
            Ok(FieldMap::new())
        })
    }

    fn remove_item(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        let file = req_str(input, "file")?;
        let index = req_i64(input, "index")?;
        self.with_file(&owner, &file, |entry| {
            let i = usize::try_from(index)
                .ok()
                .filter(|i| *i < entry.items.len())
                .ok_or_else(|| format!("Index '{index}' is out of bounds."))?;
            entry.items.remove(i);
            Ok(FieldMap::new())
        })
    }

    fn set_image(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        let file = req_str(input, "file")?;
        let image = req_str(input, "image")?;
        self.with_file(&owner, &file, |entry| {
            entry.image = Some(image);
            Ok(FieldMap::new())
        })
    }

    fn clear_image(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let owner = req_str(input, "owner")?;
        let file = req_str(input, "file")?;
        self.with_file(&owner, &file, |entry| {
            entry.image = None;
            Ok(FieldMap::new())
        })
    }

    /// One row per file, for per-file fan-out.
    fn all_files(&self, input: &FieldMap) -> Rows {
        let owner = match req_str(input, "owner") {
            Ok(owner) => owner,
            Err(msg) => return Rows::error(msg),
        };
        let mut rows: Vec<FieldMap> = self
            .files
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| {
                let mut row = FieldMap::new();
                row.insert("file".to_string(), json!(e.key()));
                row.insert("items".to_string(), json!(e.value().items));
                if let Some(image) = &e.value().image {
                    row.insert("image".to_string(), json!(image));
                }
                row
            })
            .collect();
        rows.sort_by_key(|row| row["file"].as_str().map(str::to_string));
        Rows::Rows(rows)
    }

    /// A single row listing all of an owner's files, for list responses.
    fn file_list(&self, input: &FieldMap) -> Rows {
        match self.all_files(input) {
            Rows::Rows(rows) => Rows::one([("files", Value::Array(
                rows.into_iter().map(Value::Object).collect(),
            ))]),
            err => err,
        }
    }

    fn file_string(&self, input: &FieldMap) -> Rows {
        let owner = match req_str(input, "owner") {
            Ok(owner) => owner,
            Err(msg) => return Rows::error(msg),
        };
        let file = match req_str(input, "file") {
            Ok(file) => file,
            Err(msg) => return Rows::error(msg),
        };
        match self.files.get(&file) {
            Some(entry) if entry.value().owner == owner => {
                Rows::one([("fileString", json!(entry.value().items.join("\n")))])
            }
            _ => Rows::none(),
        }
    }
}

#[async_trait]
impl Concept for Library {
    fn name(&self) -> &str {
        "Library"
    }

    async fn action(&self, op: &str, input: &FieldMap) -> Reply {
        match op {
            "create" => self.create(input).into(),
            "delete" => self.delete(input).into(),
            "createFile" => self.create_file(input).into(),
            "addFile" => self.add_file(input).into(),
            "modifyFile" => self.modify_file(input).into(),
            "deleteFile" => self.delete_file(input).into(),
            "addItemToFile" => self.add_item(input).into(),
            "modifyItemInFile" => self.modify_item(input).into(),
            "removeItemFromFile" => self.remove_item(input).into(),
            "setImageToFile" => self.set_image(input).into(),
            "clearImageFromFile" => self.clear_image(input).into(),
            other => Reply::error(format!("Unknown action '{other}'.")),
        }
    }

    async fn query(&self, op: &str, input: &FieldMap) -> Rows {
        match op {
            "_getAllFiles" => self.all_files(input),
            "_getFiles" => self.file_list(input),
            "_getFileString" => self.file_string(input),
            other => Rows::error(format!("Unknown query '{other}'.")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn with_library(owner: &str) -> Library {
        let lib = Library::new();
        let created = lib
            .action("create", &wire(&[("owner", json!(owner))]))
            .await;
        assert!(!created.is_error());
        lib
    }

    fn file_id(reply: Reply) -> String {
        match reply {
            Reply::Success(fields) => fields["id"].as_str().unwrap().to_string(),
            Reply::Error(msg) => panic!("expected success, got error: {msg}"),
        }
    }

    #[tokio::test]
    async fn add_modify_delete_file_lifecycle() {
        let lib = with_library("alice").await;
        let input = wire(&[("owner", json!("alice")), ("items", json!(["hello", "this is a file"]))]);
        let id = file_id(lib.action("addFile", &input).await);

        let modified = lib
            .action(
                "modifyFile",
                &wire(&[
                    ("owner", json!("alice")),
                    ("file", json!(id)),
                    ("items", json!(["hello", "this is still a file"])),
                ]),
            )
            .await;
        assert!(!modified.is_error());

        match lib
            .query("_getFileString", &wire(&[("owner", json!("alice")), ("file", json!(id))]))
            .await
        {
            Rows::Rows(rows) => {
                assert_eq!(rows[0]["fileString"], json!("hello\nthis is still a file"));
            }
            Rows::Error(msg) => panic!("unexpected error: {msg}"),
        }

        let deleted = lib
            .action(
                "deleteFile",
                &wire(&[("owner", json!("alice")), ("file", json!(id))]),
            )
            .await;
        assert!(!deleted.is_error());
        match lib.query("_getAllFiles", &wire(&[("owner", json!("alice"))])).await {
            Rows::Rows(rows) => assert!(rows.is_empty()),
            Rows::Error(msg) => panic!("unexpected error: {msg}"),
        }
    }

    #[tokio::test]
    async fn duplicate_library_and_duplicate_file_rejected() {
        let lib = with_library("bob").await;
        let again = lib.action("create", &wire(&[("owner", json!("bob"))])).await;
        assert!(again.is_error());

        let input = wire(&[("owner", json!("bob")), ("items", json!(["this", "is", "not", "true."]))]);
        assert!(!lib.action("addFile", &input).await.is_error());
        assert!(lib.action("addFile", &input).await.is_error());
    }

    #[tokio::test]
    async fn delete_file_enforces_ownership() {
        let lib = with_library("alice").await;
        lib.action("create", &wire(&[("owner", json!("bob"))])).await;
        let id = file_id(
            lib.action(
                "addFile",
                &wire(&[("owner", json!("alice")), ("items", json!(["doc1.txt"]))]),
            )
            .await,
        );

        // No library at all.
        assert!(lib
            .action(
                "deleteFile",
                &wire(&[("owner", json!("nobody")), ("file", json!(id))]),
            )
            .await
            .is_error());
        // A library, but not this file.
        assert!(lib
            .action(
                "deleteFile",
                &wire(&[("owner", json!("bob")), ("file", json!(id))]),
            )
            .await
            .is_error());
    }

    #[tokio::test]
    async fn item_edits_are_bounds_checked() {
        let lib = with_library("alice").await;
        let id = file_id(
            lib.action(
                "addFile",
                &wire(&[("owner", json!("alice")), ("items", json!(["a", "b"]))]),
            )
            .await,
        );

        let ok = lib
            .action(
                "modifyItemInFile",
                &wire(&[
                    ("owner", json!("alice")),
                    ("file", json!(id)),
                    ("index", json!(1)),
                    ("newItem", json!("c")),
                ]),
            )
            .await;
        assert!(!ok.is_error());

        let oob = lib
            .action(
                "removeItemFromFile",
                &wire(&[("owner", json!("alice")), ("file", json!(id)), ("index", json!(5))]),
            )
            .await;
        assert_eq!(oob, Reply::error("Index '5' is out of bounds."));
    }

    #[tokio::test]
    async fn image_set_and_clear() {
        let lib = with_library("alice").await;
        let id = file_id(
            lib.action(
                "addFile",
                &wire(&[("owner", json!("alice")), ("items", json!(["x"]))]),
            )
            .await,
        );
        assert!(!lib
            .action(
                "setImageToFile",
                &wire(&[
                    ("owner", json!("alice")),
                    ("file", json!(id)),
                    ("image", json!("https://example.org/cat.png")),
                ]),
            )
            .await
            .is_error());
        match lib.query("_getAllFiles", &wire(&[("owner", json!("alice"))])).await {
            Rows::Rows(rows) => assert_eq!(rows[0]["image"], json!("https://example.org/cat.png")),
            Rows::Error(msg) => panic!("unexpected error: {msg}"),
        }
        assert!(!lib
            .action(
                "clearImageFromFile",
                &wire(&[("owner", json!("alice")), ("file", json!(id))]),
            )
            .await
            .is_error());
    }

    #[tokio::test]
    async fn file_list_is_a_single_row() {
        let lib = with_library("alice").await;
        lib.action(
            "addFile",
            &wire(&[("owner", json!("alice")), ("items", json!(["a"]))]),
        )
        .await;
        lib.action(
            "addFile",
            &wire(&[("owner", json!("alice")), ("items", json!(["b"]))]),
        )
        .await;
        match lib.query("_getFiles", &wire(&[("owner", json!("alice"))])).await {
            Rows::Rows(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0]["files"].as_array().unwrap().len(), 2);
            }
            Rows::Error(msg) => panic!("unexpected error: {msg}"),
        }
    }
}
