use async_trait::async_trait;

use crate::{
    backend::{AuthBackend, Authenticated, Credentials},
    login::{hash_signer, session_hash_matches, SESSION_HASH, SESSION_KEY},
    signing::Signer,
    Connection, Error, Identity, UserLoader,
};

/// Authenticates requests from the identity stored in their session by
/// [`login`](crate::login::login).
///
/// The stored session-auth-hash must match the user's current password hash.
/// A user restored this way is granted the scopes it reports through
/// [`Identity::scopes`]. The session is only read, never modified.
#[derive(Debug, Clone)]
pub struct SessionBackend<Loader> {
    loader: Loader,
    hash_signer: Signer,
}

impl<Loader: UserLoader> SessionBackend<Loader> {
    /// Creates a backend loading users through `loader`.
    ///
    /// `signer` must be the signer sessions are logged in with.
    pub fn new(loader: Loader, signer: &Signer) -> Self {
        Self {
            loader,
            hash_signer: hash_signer(signer),
        }
    }
}

#[async_trait]
impl<Loader: UserLoader> AuthBackend for SessionBackend<Loader> {
    type User = Loader::User;

    async fn authenticate(
        &self,
        conn: &Connection,
    ) -> Result<Option<Authenticated<Self::User>>, Error> {
        let Some(session) = conn.session() else {
            return Ok(None);
        };

        let identity = match session.get::<String>(SESSION_KEY).await? {
            Some(identity) if !identity.is_empty() => identity,
            _ => return Ok(None),
        };

        let Some(user) = self
            .loader
            .load_user(conn, &identity)
            .await
            .map_err(Error::loader)?
        else {
            tracing::debug!(user.id = %identity, "session refers to an unknown user");
            return Ok(None);
        };

        let stored_hash = session.get::<String>(SESSION_HASH).await?;
        if !session_hash_matches(&self.hash_signer, &user, stored_hash.as_deref()) {
            tracing::debug!(user.id = %identity, "session auth hash does not match");
            return Ok(None);
        }

        let credentials = user.scopes().map(Credentials::new).unwrap_or_default();

        Ok(Some((credentials, user)))
    }

    fn name(&self) -> &'static str {
        "session"
    }
}
