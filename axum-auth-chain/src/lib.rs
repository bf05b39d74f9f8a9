//! Pluggable session and remember-me authentication for Axum.
//!
//! This crate provides Tower middleware which resolves every request into an
//! optional user and a set of granted scopes, by running a chain of
//! authentication backends. With it, these workflows are made easy:
//!
//! 1. Logging users in and out,
//! 2. Keeping users logged in across browser sessions with a remember-me
//!    cookie,
//! 3. Accessing the current user within a route,
//! 4. Protecting access to a resource.
//!
//! User storage is decoupled from authentication: any storage for which
//! [`UserLoader`] is implemented is supported. Likewise any user type which
//! implements [`Identity`] may be used.
//!
//! Sessions are provided via [`tower-sessions`](tower_sessions). The
//! [`AuthManagerLayer`] wraps the session layer it is given, so the session is
//! available to backends and handlers.
//!
//! # Backends
//!
//! An [`AuthBackend`] turns a [`Connection`] into credentials and a user, or
//! declines. Two backends are provided:
//!
//! - [`SessionBackend`] restores the user stored in the session by
//!   [`login`](login::login). Sessions are bound to the user's password hash
//!   through a session-auth-hash, so changing a password logs out every other
//!   session.
//! - [`RememberMeBackend`] restores the user named in a signed cookie set by
//!   [`remember_me`](remember_me::remember_me).
//!
//! [`MultiBackend`] tries backends in order and returns the first success.
//!
//! # Scopes
//!
//! A user who just logged in interactively holds
//! [`FRESH`](scopes::FRESH). A user restored from a remember-me cookie holds
//! [`REMEMBERED`](scopes::REMEMBERED) instead, and applications may require
//! confirmation, e.g. re-entering the password, before sensitive operations.
//! See [`AuthSession::is_confirmed`] and [`AuthSession::confirm_login`].
//!
//! # Example
//!
//! Note that the below example makes use of memory-based stores for
//! demonstration purposes only.
//!
//! ```rust,no_run
//! use axum::{
//!     extract::State,
//!     http::StatusCode,
//!     response::{IntoResponse, Redirect},
//!     routing::{get, post},
//!     Router,
//! };
//! use axum_auth_chain::{
//!     memory_store::MemoryUserLoader,
//!     remember_me::{forget_me, remember_me},
//!     tower_sessions::{MemoryStore, SessionManagerLayer},
//!     AuthConfig, AuthManagerLayer, AuthSession, Connection, Identity, LoginRequiredLayer,
//!     MultiBackend, RememberMeBackend, SessionBackend,
//! };
//!
//! #[derive(Debug, Clone)]
//! struct User {
//!     username: String,
//!     pw_hash: Vec<u8>,
//! }
//!
//! impl Identity for User {
//!     fn identity(&self) -> String {
//!         self.username.clone()
//!     }
//!
//!     fn password_hash(&self) -> Option<&[u8]> {
//!         Some(&self.pw_hash)
//!     }
//! }
//!
//! fn ferris() -> User {
//!     User {
//!         username: "ferris".to_owned(),
//!         pw_hash: b"$argon2id$...".to_vec(),
//!     }
//! }
//!
//! async fn login(
//!     mut auth_session: AuthSession<User>,
//!     State(config): State<AuthConfig>,
//!     conn: Connection,
//! ) -> impl IntoResponse {
//!     // Verify the submitted password here.
//!     let user = ferris();
//!
//!     if auth_session.login(&user).await.is_err() {
//!         return StatusCode::INTERNAL_SERVER_ERROR.into_response();
//!     }
//!
//!     let mut res = Redirect::to("/").into_response();
//!     let duration = config.remember_duration();
//!     if remember_me(&mut res, &conn, config.signer(), &user, duration).is_err() {
//!         return StatusCode::INTERNAL_SERVER_ERROR.into_response();
//!     }
//!
//!     res
//! }
//!
//! async fn logout(mut auth_session: AuthSession<User>) -> impl IntoResponse {
//!     if auth_session.logout().await.is_err() {
//!         return StatusCode::INTERNAL_SERVER_ERROR.into_response();
//!     }
//!
//!     let mut res = Redirect::to("/login").into_response();
//!     if forget_me(&mut res).is_err() {
//!         return StatusCode::INTERNAL_SERVER_ERROR.into_response();
//!     }
//!
//!     res
//! }
//!
//! async fn protected(auth_session: AuthSession<User>) -> impl IntoResponse {
//!     match auth_session.user {
//!         Some(user) => format!("Logged in as: {}", user.display_name()),
//!         None => "Logged out".to_owned(),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthConfig::from_env()?;
//!
//!     let loader = MemoryUserLoader::from_users([ferris()]);
//!     let backend = MultiBackend::new()
//!         .with(SessionBackend::new(loader.clone(), config.signer()))
//!         .with(
//!             RememberMeBackend::new(loader, config.signer())
//!                 .with_max_age(config.remember_duration()),
//!         );
//!
//!     let session_layer = SessionManagerLayer::new(MemoryStore::default());
//!     let auth_layer = AuthManagerLayer::new(backend, config.signer(), session_layer);
//!
//!     let app = Router::new()
//!         .route("/", get(protected))
//!         .route_layer(LoginRequiredLayer::<User>::new().with_login_url("/login"))
//!         .route("/login", post(login))
//!         .route("/logout", post(logout))
//!         .layer(auth_layer)
//!         .with_state(config);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app.into_make_service()).await?;
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod backend;
mod config;
mod connection;
mod error;
mod identity;
pub mod login;
pub mod memory_store;
pub mod remember_me;
mod require;
pub mod scopes;
mod service;
mod session;
mod session_backend;
pub mod signing;

#[cfg(test)]
mod test_support;

pub use backend::{AuthBackend, Authenticated, Credentials, MultiBackend};
pub use config::{AuthConfig, AuthConfigBuilder, ConfigError, DEFAULT_REMEMBER_DURATION};
pub use connection::{Connection, ConnectionKind};
pub use error::{BoxError, Error};
pub use identity::{Identity, UserLoader};
pub use remember_me::RememberMeBackend;
pub use require::{LoginRequired, LoginRequiredLayer, RouteError, RouteTable};
pub use service::{AuthManager, AuthManagerLayer};
pub use session::AuthSession;
pub use session_backend::SessionBackend;
pub use signing::{Signer, SigningError};
pub use tower_sessions;
