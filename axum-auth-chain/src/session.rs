use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use tower_sessions::Session;

use crate::{
    backend::{Authenticated, Credentials},
    login, scopes,
    scopes::FRESH,
    signing::Signer,
    Error, Identity,
};

/// The authentication state of the current request.
///
/// An `AuthSession` is inserted into the request extensions by
/// [`AuthManager`](crate::AuthManager) and can be extracted in handlers. It
/// holds the user and credentials the backend resolved, along with the
/// session used to log users in and out.
///
/// Changes made through this type apply to the session and to this value.
/// Other clones, such as the one seen by an outer middleware, keep the state
/// they were created with.
#[derive(Debug, Clone)]
pub struct AuthSession<User: Identity> {
    /// The user resolved for this request. `None` when not logged in.
    pub user: Option<User>,

    /// The scopes granted to [`user`](Self::user).
    pub credentials: Credentials,

    session: Option<Session>,
    signer: Signer,
}

impl<User: Identity> AuthSession<User> {
    pub(crate) fn new(
        session: Option<Session>,
        signer: Signer,
        authenticated: Option<Authenticated<User>>,
    ) -> Self {
        let (credentials, user) = match authenticated {
            Some((credentials, user)) => (credentials, Some(user)),
            None => (Credentials::default(), None),
        };

        Self {
            user,
            credentials,
            session,
            signer,
        }
    }

    /// The underlying session, if a session layer is installed.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns `true` if a user is attached and reports itself authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.user.as_ref().is_some_and(Identity::is_authenticated)
    }

    /// Returns `true` if the current login is fresh.
    pub fn is_confirmed(&self) -> bool {
        scopes::is_confirmed(&self.credentials)
    }

    /// Marks the current login as fresh for the rest of this request.
    pub fn confirm_login(&mut self) {
        scopes::confirm_login(&mut self.credentials);
    }

    /// Logs `user` in and attaches it to this request.
    ///
    /// The user is granted its own scopes plus [`FRESH`].
    pub async fn login(&mut self, user: &User) -> Result<(), Error> {
        let session = self.session.as_ref().ok_or(Error::MissingSession)?;
        login::login(session, user, &self.signer).await?;

        let mut credentials = user
            .scopes()
            .map(Credentials::new)
            .unwrap_or_default();
        credentials.grant(FRESH);

        self.user = Some(user.clone());
        self.credentials = credentials;

        Ok(())
    }

    /// Logs the current user out, returning it.
    ///
    /// Without a session there is nothing to clear, and only this value is
    /// reset.
    pub async fn logout(&mut self) -> Result<Option<User>, Error> {
        if let Some(ref session) = self.session {
            login::logout(session).await?;
        }

        self.credentials = Credentials::default();
        Ok(self.user.take())
    }

    /// Re-binds the session to the current user's password hash.
    ///
    /// Assign the updated user to [`user`](Self::user) before calling this.
    pub async fn update_session_auth_hash(&self) -> Result<(), Error> {
        let (Some(session), Some(user)) = (&self.session, &self.user) else {
            return Ok(());
        };

        login::update_session_auth_hash(session, user, &self.signer).await
    }
}

#[async_trait]
impl<S, User> FromRequestParts<S> for AuthSession<User>
where
    S: Send + Sync,
    User: Identity,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            tracing::error!("auth session missing from request extensions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Can't extract auth session. Is `AuthManagerLayer` enabled?",
            )
        })
    }
}
