use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{ERR_EMPTY_NAME, ERR_INVALID_EMAIL};
use crate::error::{AppError, Result};

/// Account record; `password` holds the digest produced by the password hasher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn from_new(id: String, created_at: DateTime<Utc>, new: NewUser) -> Self {
        Self {
            id,
            email: new.email,
            name: new.name,
            password: new.password,
            created_at,
        }
    }

    /// Loose shape check: something before and after a single `@`
    pub fn validate_email(email: &str) -> bool {
        let mut parts = email.trim().split('@');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => !local.is_empty() && domain.contains('.'),
            _ => false,
        }
    }
}

/// Input for creating a user
///
/// Backends store `password` as given. The service layer hashes plaintext
/// before it reaches a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl NewUser {
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !User::validate_email(&self.email) {
            return Err(AppError::InvalidInput(ERR_INVALID_EMAIL.to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidInput(ERR_EMPTY_NAME.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPatch {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

impl UserPatch {
    pub fn validate(&self) -> Result<()> {
        if let Some(email) = &self.email {
            if !User::validate_email(email) {
                return Err(AppError::InvalidInput(ERR_INVALID_EMAIL.to_string()));
            }
        }
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(AppError::InvalidInput(ERR_EMPTY_NAME.to_string()));
            }
        }
        Ok(())
    }

    pub fn apply(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(password) = self.password {
            user.password = password;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(User::validate_email("admin@gmail.com"));
        assert!(User::validate_email(" someone@example.org "));
        assert!(!User::validate_email("no-at-sign"));
        assert!(!User::validate_email("@example.com"));
        assert!(!User::validate_email("a@b@c.com"));
        assert!(!User::validate_email("user@localhost"));
    }

    #[test]
    fn test_new_user_validation() {
        assert!(NewUser::new("a@b.com", "Alice", "x").validate().is_ok());
        assert!(NewUser::new("a@b.com", "   ", "x").validate().is_err());
        assert!(NewUser::new("ab.com", "Alice", "x").validate().is_err());
    }

    #[test]
    fn test_patch_keeps_unspecified_fields() {
        let mut user = User::from_new(
            "u1".into(),
            Utc::now(),
            NewUser::new("a@b.com", "Alice", "digest"),
        );

        UserPatch {
            name: Some("Alicia".into()),
            ..Default::default()
        }
        .apply(&mut user);

        assert_eq!(user.name, "Alicia");
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.password, "digest");
    }
}
