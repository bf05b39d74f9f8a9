use axum::http::{self, header::InvalidHeaderValue};
use tower_sessions::session;

use crate::require::RouteError;

/// A boxed error, as produced by user loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by authentication infrastructure.
///
/// Rejected credentials are never reported through this type: a missing
/// session entry, an unknown identity, a stale session hash or an invalid
/// remember-me token all resolve to "not authenticated".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mapping to `tower_sessions::session::Error`.
    #[error(transparent)]
    Session(#[from] session::Error),

    /// The request carries no session. Is `SessionManagerLayer` installed?
    #[error("no session attached to the request")]
    MissingSession,

    /// The user loader failed to look up an identity.
    #[error("user loader failed: {0}")]
    Loader(#[source] BoxError),

    /// A cookie or location could not be encoded as a header value.
    #[error(transparent)]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// The login redirect target could not be resolved.
    #[error(transparent)]
    Route(#[from] RouteError),

    /// The login redirect target is not a valid URI.
    #[error(transparent)]
    Http(#[from] http::Error),
}

impl Error {
    /// Wraps a user loader failure.
    pub fn loader(err: impl Into<BoxError>) -> Self {
        Self::Loader(err.into())
    }
}
