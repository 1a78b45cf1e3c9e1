mod repository;
mod service;

pub use repository::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::random_token;
use crate::token::Principal;

const ID_LENGTH: usize = 12;

/// Account role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Client,
    Admin,
}

/// User as saved on storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Argon2 PHC string.
    pub password: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    /// One-time token sent by mail, cleared once the account is verified.
    pub verify_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create an inactive [`User`] waiting for email verification.
    ///
    /// Username and display name default to the local part of the email.
    pub fn new(email: &str, password_hash: String, verify_token: String) -> Self {
        let name = email.split('@').next().unwrap_or_default().to_owned();

        Self {
            id: random_token(ID_LENGTH),
            email: email.to_owned(),
            password: password_hash,
            username: name.clone(),
            display_name: name,
            avatar: None,
            role: Role::default(),
            is_active: false,
            verify_token: Some(verify_token),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Identity embedded in tokens.
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }

    /// Fields safe to send to the client.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar: self.avatar.clone(),
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Public profile of a [`User`]. Never carries password or verification token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user() {
        let user = User::new("ada@example.com", "$argon2id$...".into(), "abc".into());

        assert_eq!(user.id.len(), ID_LENGTH * 2);
        assert_eq!(user.username, "ada");
        assert_eq!(user.display_name, "ada");
        assert!(!user.is_active);
        assert_eq!(user.principal().email, "ada@example.com");

        let public = serde_json::to_value(user.public()).unwrap();
        assert!(public.get("password").is_none());
        assert!(public.get("verifyToken").is_none());
        assert_eq!(public["displayName"], "ada");
        assert_eq!(public["role"], "client");
    }
}
