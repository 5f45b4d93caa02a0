//! User credential configuration
//!
//! The `users` section is either a map of username to password or the older
//! array of `{"username": .., "password": ..}` entries.

use crate::socks::Authenticator;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Configured credentials, keyed by username
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersConfig(pub BTreeMap<String, String>);

impl UsersConfig {
    /// Check if no user is configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of configured users
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Credential table for authentication, `None` when no user is configured
    pub fn user_table(&self) -> Option<UserTable> {
        if self.is_empty() {
            return None;
        }
        Some(UserTable {
            users: self
                .0
                .iter()
                .map(|(name, pass)| (name.clone(), pass.clone()))
                .collect(),
        })
    }
}

/// Entry of the legacy array form
#[derive(Deserialize)]
struct UserEntry {
    username: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UsersShape {
    Map(BTreeMap<String, String>),
    List(Vec<UserEntry>),
}

impl<'de> Deserialize<'de> for UsersConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<UsersShape>::deserialize(deserializer)? {
            None => UsersConfig::default(),
            Some(UsersShape::Map(users)) => UsersConfig(users),
            // Later entries win on duplicate usernames
            Some(UsersShape::List(entries)) => UsersConfig(
                entries
                    .into_iter()
                    .map(|entry| (entry.username, entry.password))
                    .collect(),
            ),
        })
    }
}

impl Serialize for UsersConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_empty() {
            serializer.serialize_none()
        } else {
            self.0.serialize(serializer)
        }
    }
}

/// Username/password table used to authenticate clients
#[derive(Clone)]
pub struct UserTable {
    users: HashMap<String, String>,
}

impl std::fmt::Debug for UserTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserTable")
            .field("users", &self.users.len())
            .finish()
    }
}

impl Authenticator for UserTable {
    fn verify(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(expected) => {
                if constant_time_compare(expected.as_bytes(), password.as_bytes()) {
                    tracing::debug!(username = %username, "User authenticated");
                    true
                } else {
                    tracing::error!(username = %username, "User authentication failed");
                    false
                }
            }
            None => {
                tracing::error!(username = %username, "User not found");
                false
            }
        }
    }
}

/// Constant-time comparison of two byte slices
///
/// The running time depends only on the lengths, not on where the
/// slices differ.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
