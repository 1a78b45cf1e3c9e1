//! User storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, ServerError};
use crate::user::User;

/// Lookup and update of user records.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user using `id` field.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Find a user using `email` field.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Insert [`User`]. Fails with a conflict if the email is taken.
    async fn insert(&self, user: &User) -> Result<()>;

    /// Replace a stored [`User`].
    async fn update(&self, user: &User) -> Result<()>;
}

/// Users kept in process memory, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserRepository {
    /// Create a new [`MemoryUserRepository`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == user.email) || users.contains_key(&user.id) {
            return Err(ServerError::AccountConflict);
        }

        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        match self.users.write().await.get_mut(&user.id) {
            Some(stored) => {
                *stored = user.clone();
                Ok(())
            },
            None => Err(ServerError::AccountNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_repository() {
        let repo = MemoryUserRepository::new();
        let mut user = User::new("ada@example.com", "hash".into(), "token".into());

        repo.insert(&user).await.unwrap();
        assert_eq!(repo.find_by_id(&user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(
            repo.find_by_email("ada@example.com").await.unwrap(),
            Some(user.clone())
        );
        assert_eq!(repo.find_by_email("bob@example.com").await.unwrap(), None);

        let twin = User::new("ada@example.com", "hash".into(), "token".into());
        assert!(matches!(
            repo.insert(&twin).await,
            Err(ServerError::AccountConflict)
        ));

        user.is_active = true;
        repo.update(&user).await.unwrap();
        assert!(repo.find_by_id(&user.id).await.unwrap().unwrap().is_active);

        assert!(matches!(
            repo.update(&twin).await,
            Err(ServerError::AccountNotFound)
        ));
    }
}
