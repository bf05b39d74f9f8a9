//! Writing and clearing the authentication state of a session.

use tower_sessions::Session;

use crate::{signing::Signer, Error, Identity};

/// Session key holding the identity of the logged in user.
pub const SESSION_KEY: &str = "_auth_user_id";

/// Session key holding the session-auth-hash of the logged in user.
pub const SESSION_HASH: &str = "_auth_user_hash";

/// Value hashed in place of a password hash for users that have none.
///
/// Every session of such a user carries the same marker, so changing anything
/// about the user never invalidates their sessions.
pub const HASHLESS_SENTINEL: &[u8] = b"axum-auth-chain:no-password-hash";

const SESSION_HASH_SALT: &str = "session-auth-hash";

pub(crate) fn hash_signer(signer: &Signer) -> Signer {
    signer.derive(SESSION_HASH_SALT)
}

/// Computes the session-auth-hash of `user`.
///
/// The hash binds a session to the user's current password hash: once that
/// changes, sessions holding the old hash stop authenticating.
pub fn session_auth_hash<User: Identity>(signer: &Signer, user: &User) -> String {
    hash_signer(signer).digest(user.password_hash().unwrap_or(HASHLESS_SENTINEL))
}

/// Checks a stored hash with a signer returned by [`hash_signer`].
///
/// Users without a password hash always pass.
pub(crate) fn session_hash_matches<User: Identity>(
    hash_signer: &Signer,
    user: &User,
    stored: Option<&str>,
) -> bool {
    let Some(password_hash) = user.password_hash() else {
        return true;
    };

    stored.is_some_and(|stored| hash_signer.verify_digest(password_hash, stored))
}

/// Logs `user` in on `session`.
///
/// Data already in the session is kept when it belongs to the same user and
/// its hash is still valid; otherwise the session is cleared first. The
/// session id is regenerated in either case.
#[tracing::instrument(level = "debug", skip_all, fields(user.id = user.identity()), ret, err)]
pub async fn login<User: Identity>(
    session: &Session,
    user: &User,
    signer: &Signer,
) -> Result<(), Error> {
    let identity = user.identity();
    let hash_signer = hash_signer(signer);

    if let Some(current) = session.get::<String>(SESSION_KEY).await? {
        let stored_hash = session.get::<String>(SESSION_HASH).await?;
        if current != identity || !session_hash_matches(&hash_signer, user, stored_hash.as_deref())
        {
            tracing::debug!("discarding session data of another login");
            session.clear().await;
        }
    }

    session.cycle_id().await?; // Session-fixation mitigation.

    let hash = hash_signer.digest(user.password_hash().unwrap_or(HASHLESS_SENTINEL));
    session.insert(SESSION_KEY, identity).await?;
    session.insert(SESSION_HASH, hash).await?;

    Ok(())
}

/// Logs the current user out, removing all session data.
#[tracing::instrument(level = "debug", skip_all, ret, err)]
pub async fn logout(session: &Session) -> Result<(), Error> {
    session.flush().await?;
    Ok(())
}

/// Stores a fresh session-auth-hash for `user`.
///
/// Call this after changing the user's password so the session that made the
/// change stays logged in while every other session is invalidated.
#[tracing::instrument(level = "debug", skip_all, fields(user.id = user.identity()), ret, err)]
pub async fn update_session_auth_hash<User: Identity>(
    session: &Session,
    user: &User,
    signer: &Signer,
) -> Result<(), Error> {
    if session.get::<String>(SESSION_KEY).await?.as_deref() != Some(user.identity().as_str()) {
        tracing::debug!("session belongs to another user, leaving it untouched");
        return Ok(());
    }

    session
        .insert(SESSION_HASH, session_auth_hash(signer, user))
        .await?;

    Ok(())
}
