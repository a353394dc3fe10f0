//! Library rules: library and file lifecycle, item edits, images, and
//! the two read routes.
//!
//! Deleting a library fans out: `CascadeFileDeletion` watches for a
//! successful `Library.delete` and dispatches one `Library.deleteFile`
//! per file the owner still has. Deleting a file also tears down any
//! tracking on it.

use crate::rule::{lit, var, Rule, NO_FIELDS};

use super::{error_response, invalid_session, status_response};

pub fn rules() -> Vec<Rule> {
    vec![
        // --- create ---
        Rule::on("CreateLibraryRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/create")),
                    ("session", var("session")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then("Library.create", [("owner", var("user"))])
            .build(),
        Rule::on("CreateLibraryResponse")
            .when(
                "Requesting.request",
                [("path", lit("/Library/create"))],
                [("request", var("request"))],
            )
            .when("Library.create", NO_FIELDS, [("library", var("library"))])
            .then(
                "Requesting.respond",
                [("request", var("request")), ("library", var("library"))],
            )
            .build(),
        error_response("CreateLibraryResponseError", "/Library/create", "Library.create"),
        invalid_session("CreateLibraryAuthError", "/Library/create"),
        // --- delete ---
        Rule::on("DeleteLibraryRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/delete")),
                    ("session", var("session")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then("Library.delete", [("owner", var("user"))])
            .build(),
        status_response(
            "DeleteLibraryResponse",
            "/Library/delete",
            "Library.delete",
            "deleted",
        ),
        error_response("DeleteLibraryResponseError", "/Library/delete", "Library.delete"),
        invalid_session("DeleteLibraryAuthError", "/Library/delete"),
        // One deleteFile per file the owner still has. Files survive the
        // library record itself, so the fan-out sees all of them.
        Rule::on("CascadeFileDeletion")
            .when("Library.delete", [("owner", var("owner"))], NO_FIELDS)
            .query(
                "Library._getAllFiles",
                [("owner", var("owner"))],
                [("file", "file")],
            )
            .then(
                "Library.deleteFile",
                [("owner", var("owner")), ("file", var("file"))],
            )
            .build(),
        // --- createFile ---
        Rule::on("CreateFileRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/createFile")),
                    ("session", var("session")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then("Library.createFile", [("owner", var("user"))])
            .build(),
        Rule::on("CreateFileResponse")
            .when(
                "Requesting.request",
                [("path", lit("/Library/createFile"))],
                [("request", var("request"))],
            )
            .when("Library.createFile", NO_FIELDS, [("id", var("file"))])
            .then(
                "Requesting.respond",
                [("request", var("request")), ("id", var("file"))],
            )
            .build(),
        error_response(
            "CreateFileResponseError",
            "/Library/createFile",
            "Library.createFile",
        ),
        invalid_session("CreateFileAuthError", "/Library/createFile"),
        // --- deleteFile ---
        Rule::on("DeleteFileRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/deleteFile")),
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
                "Library.deleteFile",
                [("owner", var("user")), ("file", var("file"))],
            )
            .then(
                "FileTracker.deleteTracking",
                [("owner", var("user")), ("file", var("file"))],
            )
            .build(),
        status_response(
            "DeleteFileResponse",
            "/Library/deleteFile",
            "Library.deleteFile",
            "deleted",
        ),
        error_response(
            "DeleteFileResponseError",
            "/Library/deleteFile",
            "Library.deleteFile",
        ),
        invalid_session("DeleteFileAuthError", "/Library/deleteFile"),
        // --- addItemToFile ---
        Rule::on("AddItemToFileRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/addItemToFile")),
                    ("session", var("session")),
                    ("file", var("file")),
                    ("item", var("item")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "Library.addItemToFile",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("item", var("item")),
                ],
            )
            .build(),
        Rule::on("AddItemToFileResponse")
            .when(
                "Requesting.request",
                [("path", lit("/Library/addItemToFile"))],
                [("request", var("request"))],
            )
            .when("Library.addItemToFile", NO_FIELDS, NO_FIELDS)
            .then("Requesting.respond", [("request", var("request"))])
            .build(),
        error_response(
            "AddItemToFileResponseError",
            "/Library/addItemToFile",
            "Library.addItemToFile",
        ),
        invalid_session("AddItemToFileAuthError", "/Library/addItemToFile"),
        // --- modifyItemInFile ---
        Rule::on("ModifyItemInFileRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/modifyItemInFile")),
                    ("session", var("session")),
                    ("file", var("file")),
                    ("index", var("index")),
                    ("newItem", var("newItem")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "Library.modifyItemInFile",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("index", var("index")),
                    ("newItem", var("newItem")),
                ],
            )
            .build(),
        Rule::on("ModifyItemInFileResponse")
            .when(
                "Requesting.request",
                [("path", lit("/Library/modifyItemInFile"))],
                [("request", var("request"))],
            )
            .when(
                "Library.modifyItemInFile",
                [("file", var("file"))],
                NO_FIELDS,
            )
            .then(
                "Requesting.respond",
                [("request", var("request")), ("file", var("file"))],
            )
            .build(),
        error_response(
            "ModifyItemInFileResponseError",
            "/Library/modifyItemInFile",
            "Library.modifyItemInFile",
        ),
        invalid_session("ModifyItemInFileAuthError", "/Library/modifyItemInFile"),
        // --- removeItemFromFile ---
        Rule::on("RemoveItemFromFileRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/removeItemFromFile")),
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
                "Library.removeItemFromFile",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("index", var("index")),
                ],
            )
            .build(),
        Rule::on("RemoveItemFromFileResponse")
            .when(
                "Requesting.request",
                [("path", lit("/Library/removeItemFromFile"))],
                [("request", var("request"))],
            )
            .when(
                "Library.removeItemFromFile",
                [("file", var("file"))],
                NO_FIELDS,
            )
            .then(
                "Requesting.respond",
                [("request", var("request")), ("file", var("file"))],
            )
            .build(),
        error_response(
            "RemoveItemFromFileResponseError",
            "/Library/removeItemFromFile",
            "Library.removeItemFromFile",
        ),
        invalid_session("RemoveItemFromFileAuthError", "/Library/removeItemFromFile"),
        // --- setImageToFile ---
        Rule::on("SetImageToFileRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/setImageToFile")),
                    ("session", var("session")),
                    ("file", var("file")),
                    ("image", var("image")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .then(
                "Library.setImageToFile",
                [
                    ("owner", var("user")),
                    ("file", var("file")),
                    ("image", var("image")),
                ],
            )
            .build(),
        status_response(
            "SetImageToFileResponse",
            "/Library/setImageToFile",
            "Library.setImageToFile",
            "image_set",
        ),
        error_response(
            "SetImageToFileResponseError",
            "/Library/setImageToFile",
            "Library.setImageToFile",
        ),
        invalid_session("SetImageToFileAuthError", "/Library/setImageToFile"),
        // --- clearImageFromFile ---
        Rule::on("ClearImageFromFileRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/clearImageFromFile")),
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
                "Library.clearImageFromFile",
                [("owner", var("user")), ("file", var("file"))],
            )
            .build(),
        status_response(
            "ClearImageFromFileResponse",
            "/Library/clearImageFromFile",
            "Library.clearImageFromFile",
            "image_cleared",
        ),
        error_response(
            "ClearImageFromFileResponseError",
            "/Library/clearImageFromFile",
            "Library.clearImageFromFile",
        ),
        invalid_session("ClearImageFromFileAuthError", "/Library/clearImageFromFile"),
        // --- read routes ---
        Rule::on("GetAllFilesRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/_getAllFiles")),
                    ("session", var("session")),
                ],
                [("request", var("request"))],
            )
            .query(
                "Sessioning._getUser",
                [("session", var("session"))],
                [("user", "user")],
            )
            .query(
                "Library._getFiles",
                [("owner", var("user"))],
                [("files", "files")],
            )
            .then(
                "Requesting.respond",
                [("request", var("request")), ("files", var("files"))],
            )
            .build(),
        Rule::on("GetAllFilesAuthError")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/_getAllFiles")),
                    ("session", var("session")),
                ],
                [("request", var("request"))],
            )
            .guard_absent("Sessioning._getUser", [("session", var("session"))])
            .then(
                "Requesting.respond",
                [
                    ("request", var("request")),
                    ("error", lit("Invalid session. Please log in again.")),
                ],
            )
            .build(),
        Rule::on("GetFileStringRequest")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/_getFileString")),
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
                "Library._getFileString",
                [("owner", var("user")), ("file", var("file"))],
                [("fileString", "fileString")],
            )
            .then(
                "Requesting.respond",
                [("request", var("request")), ("fileString", var("fileString"))],
            )
            .build(),
        Rule::on("GetFileStringMissing")
            .when(
                "Requesting.request",
                [
                    ("path", lit("/Library/_getFileString")),
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
                "Library._getFileString",
                [("owner", var("user")), ("file", var("file"))],
            )
            .then(
                "Requesting.respond",
                [
                    ("request", var("request")),
                    ("error", lit("No file found with that id.")),
                ],
            )
            .build(),
        invalid_session("GetFileStringAuthError", "/Library/_getFileString"),
    ]
}
