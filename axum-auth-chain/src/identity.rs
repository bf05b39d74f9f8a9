use std::fmt::Debug;

use async_trait::async_trait;

use crate::Connection;

/// A principal which can be identified and authenticated.
///
/// Only [`identity`](Identity::identity) is required. The remaining methods
/// are optional capabilities: returning `None` signals that the user type does
/// not provide them.
///
/// # Examples
///
/// ```rust
/// use axum_auth_chain::Identity;
///
/// #[derive(Debug, Clone)]
/// struct User {
///     username: String,
///     pw_hash: Vec<u8>,
/// }
///
/// impl Identity for User {
///     fn identity(&self) -> String {
///         self.username.clone()
///     }
///
///     fn password_hash(&self) -> Option<&[u8]> {
///         Some(&self.pw_hash)
///     }
/// }
/// ```
pub trait Identity: Debug + Clone + Send + Sync + 'static {
    /// Returns a stable identifier; this is what the session stores.
    fn identity(&self) -> String;

    /// Whether this principal counts as logged in.
    fn is_authenticated(&self) -> bool {
        true
    }

    /// Human readable name, defaulting to the identity.
    fn display_name(&self) -> String {
        self.identity()
    }

    /// Returns the credential the session is bound to, e.g. the password
    /// hash.
    ///
    /// When this value changes, sessions created under the previous value stop
    /// authenticating. Users returning `None` are never invalidated this way.
    fn password_hash(&self) -> Option<&[u8]> {
        None
    }

    /// Scopes granted to the user whenever it is restored from a session.
    fn scopes(&self) -> Option<Vec<String>> {
        None
    }
}

/// Resolves identities stored in sessions or tokens into full users.
///
/// `Ok(None)` means the identity is unknown, which is an ordinary
/// authentication failure. `Err` is reserved for infrastructure problems such
/// as an unreachable database.
#[async_trait]
pub trait UserLoader: Clone + Send + Sync + 'static {
    /// Loaded user type.
    type User: Identity;

    /// An error which can occur while loading users.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Loads the user known by `identity`.
    async fn load_user(
        &self,
        conn: &Connection,
        identity: &str,
    ) -> Result<Option<Self::User>, Self::Error>;
}
