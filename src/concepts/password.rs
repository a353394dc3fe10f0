//! Username/password identity: registration and authentication.
//!
//! Passwords are stored as salted SHA-256 digests; usernames are
//! case-sensitive and must be unique. Authenticating twice with the same
//! credentials yields the same user id.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::concept::{fresh_id, req_str, Concept, Reply, Rows};
use crate::record::FieldMap;

#[derive(Debug, Clone)]
struct UserEntry {
    user: String,
    salt: [u8; 16],
    digest: [u8; 32],
}

#[derive(Debug, Default)]
pub struct PasswordAuthentication {
    /// username -> credential record.
    users: DashMap<String, UserEntry>,
}

fn hash(salt: &[u8; 16], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

impl PasswordAuthentication {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let username = req_str(input, "username")?;
        let password = req_str(input, "password")?;
        if username.is_empty() {
            return Err("Username cannot be empty.".to_string());
        }
        if self.users.contains_key(&username) {
            return Err("Username already exists.".to_string());
        }
        let salt: [u8; 16] = rand::thread_rng().r#gen();
        let user = fresh_id("user");
        self.users.insert(
            username,
            UserEntry {
                user: user.clone(),
                salt,
                digest: hash(&salt, &password),
            },
        );
        let mut out = FieldMap::new();
        out.insert("user".to_string(), Value::String(user));
        Ok(out)
    }

    fn authenticate(&self, input: &FieldMap) -> Result<FieldMap, String> {
        let username = req_str(input, "username")?;
        let password = req_str(input, "password")?;
        let Some(entry) = self.users.get(&username) else {
            return Err(format!(
                "Invalid username: there is no user with username {username}"
            ));
        };
        if hash(&entry.salt, &password) != entry.digest {
            return Err("Password does not match!".to_string());
        }
        let mut out = FieldMap::new();
        out.insert("user".to_string(), Value::String(entry.user.clone()));
        Ok(out)
    }

    fn user_by_username(&self, input: &FieldMap) -> Rows {
        let username = match req_str(input, "username") {
            Ok(username) => username,
            Err(msg) => return Rows::error(msg),
        };
        match self.users.get(&username) {
            Some(entry) => Rows::one([
                ("user", json!(entry.user)),
                ("username", json!(username)),
            ]),
            None => Rows::none(),
        }
    }

    fn username_of(&self, input: &FieldMap) -> Rows {
        let user = match req_str(input, "user") {
            Ok(user) => user,
            Err(msg) => return Rows::error(msg),
        };
        match self.users.iter().find(|e| e.value().user == user) {
            Some(entry) => Rows::one([("username", json!(entry.key()))]),
            None => Rows::none(),
        }
    }
}

#[async_trait]
impl Concept for PasswordAuthentication {
    fn name(&self) -> &str {
        "PasswordAuthentication"
    }

    async fn action(&self, op: &str, input: &FieldMap) -> Reply {
        match op {
            "register" => self.register(input).into(),
            "authenticate" => self.authenticate(input).into(),
            other => Reply::error(format!("Unknown action '{other}'.")),
        }
    }

    async fn query(&self, op: &str, input: &FieldMap) -> Rows {
        match op {
            "_getUserByUsername" => self.user_by_username(input),
            "_getUsername" => self.username_of(input),
            other => Rows::error(format!("Unknown query '{other}'.")),
        }
    }
}
