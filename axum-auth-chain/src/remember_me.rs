//! Long-lived logins through a signed cookie.
//!
//! [`remember_me`] hands the client a token naming the user; the
//! [`RememberMeBackend`] honours it until it expires or [`forget_me`]
//! removes it. Tokens are never stored server side.

use async_trait::async_trait;
use axum::http::{header, HeaderValue, Response};
use time::Duration;
use tower_cookies::cookie::{Cookie, SameSite};

use crate::{
    backend::{AuthBackend, Authenticated, Credentials},
    config::DEFAULT_REMEMBER_DURATION,
    scopes::REMEMBERED,
    signing::Signer,
    Connection, Error, Identity, UserLoader,
};

/// Name of the cookie holding the remember-me token.
pub const REMEMBER_COOKIE_NAME: &str = "remember_me";

const REMEMBER_SALT: &str = "remember-me";

fn token_signer(signer: &Signer) -> Signer {
    signer.derive(REMEMBER_SALT)
}

/// Authenticates requests carrying a valid remember-me cookie.
///
/// Users restored this way are only granted [`REMEMBERED`], never
/// [`FRESH`](crate::scopes::FRESH).
#[derive(Debug, Clone)]
pub struct RememberMeBackend<Loader> {
    loader: Loader,
    token_signer: Signer,
    max_age: Duration,
}

impl<Loader: UserLoader> RememberMeBackend<Loader> {
    /// Creates a backend loading users through `loader`, accepting tokens up
    /// to [`DEFAULT_REMEMBER_DURATION`] old.
    pub fn new(loader: Loader, signer: &Signer) -> Self {
        Self {
            loader,
            token_signer: token_signer(signer),
            max_age: DEFAULT_REMEMBER_DURATION,
        }
    }

    /// Configure the maximum token age. This should match the duration given
    /// to [`remember_me`].
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

#[async_trait]
impl<Loader: UserLoader> AuthBackend for RememberMeBackend<Loader> {
    type User = Loader::User;

    async fn authenticate(
        &self,
        conn: &Connection,
    ) -> Result<Option<Authenticated<Self::User>>, Error> {
        let Some(token) = conn.cookie(REMEMBER_COOKIE_NAME) else {
            return Ok(None);
        };

        let identity = match self.token_signer.unsign(&token, Some(self.max_age)) {
            Ok(identity) => identity,
            Err(err) => {
                tracing::debug!(err = %err, "rejected remember-me token");
                return Ok(None);
            }
        };

        let Some(user) = self
            .loader
            .load_user(conn, &identity)
            .await
            .map_err(Error::loader)?
        else {
            tracing::debug!(user.id = %identity, "remember-me token refers to an unknown user");
            return Ok(None);
        };

        Ok(Some((Credentials::new([REMEMBERED]), user)))
    }

    fn name(&self) -> &'static str {
        "remember-me"
    }
}

/// Sets a remember-me cookie for `user` on `response`, valid for `duration`.
///
/// `conn` is the request being answered: the cookie is marked `Secure` when
/// it arrived over HTTPS.
pub fn remember_me<User, B>(
    response: &mut Response<B>,
    conn: &Connection,
    signer: &Signer,
    user: &User,
    duration: Duration,
) -> Result<(), Error>
where
    User: Identity,
{
    let token = token_signer(signer).sign(&user.identity());
    let cookie = Cookie::build((REMEMBER_COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(conn.is_secure())
        .max_age(duration)
        .build();

    set_cookie(response, &cookie)
}

/// Removes the remember-me cookie from the client.
pub fn forget_me<B>(response: &mut Response<B>) -> Result<(), Error> {
    let cookie = Cookie::build((REMEMBER_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(-1))
        .build();

    set_cookie(response, &cookie)
}

fn set_cookie<B>(response: &mut Response<B>, cookie: &Cookie<'_>) -> Result<(), Error> {
    let value = HeaderValue::try_from(cookie.to_string())?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(())
}
