use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{AuthError, StoreError};
use crate::kv::{CURRENT_USER_KEY, KeyValueStore, USERS_KEY};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid"))
        .is_match(email)
}

/// Registered users plus the current-session pointer, persisted through the
/// injected key-value store. Matching is exact string equality on both email
/// and password; emails are unique across the stored list.
#[derive(Debug)]
pub struct CredentialStore<'a, S> {
    kv: &'a S,
}

impl<S> Clone for CredentialStore<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for CredentialStore<'_, S> {}

impl<'a, S: KeyValueStore> CredentialStore<'a, S> {
    pub fn new(kv: &'a S) -> Self {
        Self { kv }
    }

    #[instrument(skip(self, password))]
    pub fn find_user(&self, email: &str, password: &str) -> Result<Option<User>, StoreError> {
        let users = self.load_users()?;
        let hit = users
            .into_iter()
            .find(|user| user.email == email && user.password == password);
        debug!(email, found = hit.is_some(), "credential lookup");
        Ok(hit)
    }

    #[instrument(skip(self))]
    pub fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self
            .load_users()?
            .iter()
            .any(|user| user.email == email))
    }

    #[instrument(skip(self, password))]
    pub fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        if !is_valid_email(email) {
            return Err(AuthError::InvalidEmail {
                email: email.to_string(),
            });
        }
        if self.email_exists(email)? {
            return Err(AuthError::DuplicateEmail {
                email: email.to_string(),
            });
        }

        let mut users = self.load_users()?;
        users.push(User {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        });
        self.save_users(&users)?;
        debug!(email, count = users.len(), "registered user");
        Ok(())
    }

    #[instrument(skip(self, user), fields(email = %user.email))]
    pub fn set_current_session(&self, user: &User) -> Result<(), StoreError> {
        let raw = serde_json::to_string(user).map_err(|source| StoreError::Encode {
            key: CURRENT_USER_KEY.to_string(),
            source,
        })?;
        self.kv.set(CURRENT_USER_KEY, &raw)
    }

    #[instrument(skip(self))]
    pub fn current_session(&self) -> Result<Option<User>, StoreError> {
        let Some(raw) = self.kv.get(CURRENT_USER_KEY)? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!(error = %err, "stored session pointer is corrupt; treating as absent");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    pub fn clear_session(&self) -> Result<(), StoreError> {
        self.kv.set(CURRENT_USER_KEY, "")
    }

    fn load_users(&self) -> Result<Vec<User>, StoreError> {
        let Some(raw) = self.kv.get(USERS_KEY)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str(&raw) {
            Ok(users) => Ok(users),
            Err(err) => {
                warn!(error = %err, "stored user list is corrupt; treating as empty");
                Ok(Vec::new())
            }
        }
    }

    fn save_users(&self, users: &[User]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(users).map_err(|source| StoreError::Encode {
            key: USERS_KEY.to_string(),
            source,
        })?;
        self.kv.set(USERS_KEY, &raw)
    }
}
