//! An in-memory implementation of [`UserLoader`].

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Connection, Identity, UserLoader};

/// An ephemeral user loader, useful for testing and demonstration purposes.
#[derive(Debug)]
pub struct MemoryUserLoader<User> {
    inner: Arc<RwLock<HashMap<String, User>>>,
}

impl<User> Clone for MemoryUserLoader<User> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<User> Default for MemoryUserLoader<User> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<User: Identity> MemoryUserLoader<User> {
    /// Creates a loader backed by a shared map of identity to user.
    ///
    /// ```rust
    /// use std::{collections::HashMap, sync::Arc};
    ///
    /// use axum_auth_chain::memory_store::MemoryUserLoader;
    /// use tokio::sync::RwLock;
    ///
    /// #[derive(Debug, Clone)]
    /// struct User(String);
    ///
    /// impl axum_auth_chain::Identity for User {
    ///     fn identity(&self) -> String {
    ///         self.0.clone()
    ///     }
    /// }
    ///
    /// let inner = Arc::new(RwLock::new(HashMap::<String, User>::new()));
    /// let loader = MemoryUserLoader::new(&inner);
    /// ```
    pub fn new(inner: &Arc<RwLock<HashMap<String, User>>>) -> Self {
        Self {
            inner: inner.clone(),
        }
    }

    /// Creates a loader holding the given users.
    pub fn from_users(users: impl IntoIterator<Item = User>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.identity(), user))
            .collect();

        Self {
            inner: Arc::new(RwLock::new(users)),
        }
    }

    /// Adds or replaces a user.
    pub async fn insert(&self, user: User) -> Option<User> {
        self.inner.write().await.insert(user.identity(), user)
    }

    /// Removes a user, returning it if present.
    pub async fn remove(&self, identity: &str) -> Option<User> {
        self.inner.write().await.remove(identity)
    }
}

#[async_trait]
impl<User: Identity> UserLoader for MemoryUserLoader<User> {
    type User = User;
    type Error = Infallible;

    async fn load_user(
        &self,
        _conn: &Connection,
        identity: &str,
    ) -> Result<Option<Self::User>, Self::Error> {
        Ok(self.inner.read().await.get(identity).cloned())
    }
}
