//! Login freshness scopes.
//!
//! A request authenticated through an interactive login carries [`FRESH`].
//! A request restored from a long-lived remember-me token carries
//! [`REMEMBERED`] instead, until the application confirms it, e.g. by asking
//! the user for their password again before a sensitive operation.

use crate::Credentials;

/// Granted when the user logged in interactively, or was confirmed.
pub const FRESH: &str = "login:fresh";

/// Granted when the user was restored from a remember-me token.
pub const REMEMBERED: &str = "login:remembered";

/// Returns `true` when the credentials hold [`FRESH`].
pub fn is_confirmed(credentials: &Credentials) -> bool {
    credentials.contains(FRESH)
}

/// Promotes the credentials to [`FRESH`].
///
/// This only affects the credentials of the current request: the session and
/// the remember-me cookie are left as they are.
pub fn confirm_login(credentials: &mut Credentials) {
    credentials.grant(FRESH);
}
