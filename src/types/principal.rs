use crate::error::ProvisionError;
use serde::Serialize;
use std::fmt;

/// Longest username accepted; keeps `db_<username>` inside every engine's
/// identifier limit (MySQL users: 32, MySQL schemas: 64, PostgreSQL: 63).
pub const MAX_USERNAME_LEN: usize = 32;

/// Name of the database owned by `username`.
pub fn database_name_for(username: &str) -> String {
    format!("db_{username}")
}

/// The account being provisioned.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    username: String,
    password: String,
}

impl Principal {
    /// Validate and build a principal. Usernames are restricted to a portable
    /// identifier alphabet so they can be embedded in DDL on every backend.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, ProvisionError> {
        let username = username.into();
        let password = password.into();
        let invalid = |reason| ProvisionError::InvalidPrincipal {
            username: username.clone(),
            reason,
        };

        let mut chars = username.chars();
        match chars.next() {
            None => return Err(invalid("username is empty")),
            Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                return Err(invalid("username must start with a letter or '_'"));
            }
            _ => {}
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid("username may only contain ASCII letters, digits and '_'"));
        }
        if username.len() > MAX_USERNAME_LEN {
            return Err(invalid("username is longer than 32 characters"));
        }
        if password.is_empty() {
            return Err(invalid("password is empty"));
        }
        if password.contains('\0') {
            return Err(invalid("password contains a NUL byte"));
        }

        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn database_name(&self) -> String {
        database_name_for(&self.username)
    }

    /// Handle for the database this principal owns.
    pub fn database(&self) -> DatabaseHandle {
        DatabaseHandle {
            name: self.database_name(),
            owner: self.username.clone(),
        }
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseHandle {
    pub name: String,
    pub owner: String,
}

/// What an ensure step did. Reported, never branched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    AlreadyPresentAndUpdated,
    Unchanged,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Outcome::Created => "created",
            Outcome::AlreadyPresentAndUpdated => "already present, updated",
            Outcome::Unchanged => "unchanged",
        })
    }
}
