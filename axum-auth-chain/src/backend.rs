use std::{collections::BTreeSet, fmt, sync::Arc};

use async_trait::async_trait;

use crate::{Connection, Error, Identity};

/// A successful authentication: the granted scopes and the user.
pub type Authenticated<User> = (Credentials, User);

/// Scopes granted to the current request's user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    scopes: BTreeSet<String>,
}

impl Credentials {
    /// Creates credentials holding `scopes`.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` when `scope` was granted.
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Iterates over the granted scopes in order.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    /// Returns `true` when no scope was granted.
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub(crate) fn grant(&mut self, scope: &str) {
        self.scopes.insert(scope.to_owned());
    }
}

impl<S: Into<String>> FromIterator<S> for Credentials {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// A mechanism which can resolve a request into an authenticated user.
///
/// A backend that does not recognise the request returns `Ok(None)`; this
/// includes requests carrying invalid or expired credentials. Errors are for
/// infrastructure failures only.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use axum_auth_chain::{AuthBackend, Authenticated, Connection, Credentials, Error, Identity};
///
/// #[derive(Debug, Clone)]
/// struct Guest;
///
/// impl Identity for Guest {
///     fn identity(&self) -> String {
///         "guest".to_owned()
///     }
/// }
///
/// /// Lets anyone presenting `?guest` in.
/// struct GuestBackend;
///
/// #[async_trait]
/// impl AuthBackend for GuestBackend {
///     type User = Guest;
///
///     async fn authenticate(
///         &self,
///         conn: &Connection,
///     ) -> Result<Option<Authenticated<Guest>>, Error> {
///         Ok(conn
///             .query_param("guest")
///             .map(|_| (Credentials::new(["guest"]), Guest)))
///     }
///
///     fn name(&self) -> &'static str {
///         "guest"
///     }
/// }
/// ```
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Authenticating user type.
    type User: Identity;

    /// Attempts to authenticate the request.
    async fn authenticate(
        &self,
        conn: &Connection,
    ) -> Result<Option<Authenticated<Self::User>>, Error>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Tries a sequence of backends in order and returns the first success.
///
/// Backends are awaited one after another, never concurrently, so the
/// outcome only depends on their order: put the preferred mechanism, usually
/// [`SessionBackend`](crate::SessionBackend), first.
pub struct MultiBackend<User: Identity> {
    backends: Vec<Arc<dyn AuthBackend<User = User>>>,
}

impl<User: Identity> MultiBackend<User> {
    /// Creates an empty chain, which authenticates nothing.
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Appends `backend` to the chain.
    pub fn with<B>(mut self, backend: B) -> Self
    where
        B: AuthBackend<User = User> + 'static,
    {
        self.backends.push(Arc::new(backend));
        self
    }

    /// Number of backends in the chain.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns `true` if the chain has no backends.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl<User: Identity> Default for MultiBackend<User> {
    fn default() -> Self {
        Self::new()
    }
}

impl<User: Identity> Clone for MultiBackend<User> {
    fn clone(&self) -> Self {
        Self {
            backends: self.backends.clone(),
        }
    }
}

impl<User: Identity> fmt::Debug for MultiBackend<User> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|backend| backend.name()))
            .finish()
    }
}

#[async_trait]
impl<User: Identity> AuthBackend for MultiBackend<User> {
    type User = User;

    async fn authenticate(
        &self,
        conn: &Connection,
    ) -> Result<Option<Authenticated<Self::User>>, Error> {
        for backend in &self.backends {
            if let Some(authenticated) = backend.authenticate(conn).await? {
                tracing::debug!(backend = backend.name(), "request authenticated");
                return Ok(Some(authenticated));
            }
        }

        Ok(None)
    }

    fn name(&self) -> &'static str {
        "multi"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::test_support::{conn, TestUser};

    struct StaticBackend {
        name: &'static str,
        user: Option<TestUser>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticBackend {
        fn new(name: &'static str, user: Option<TestUser>) -> Self {
            Self {
                name,
                user,
                calls: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl AuthBackend for StaticBackend {
        type User = TestUser;

        async fn authenticate(
            &self,
            _: &Connection,
        ) -> Result<Option<Authenticated<TestUser>>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .user
                .clone()
                .map(|user| (Credentials::new([self.name]), user)))
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl AuthBackend for FailingBackend {
        type User = TestUser;

        async fn authenticate(
            &self,
            _: &Connection,
        ) -> Result<Option<Authenticated<TestUser>>, Error> {
            Err(Error::loader("database is down"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_credentials() {
        let mut credentials: Credentials = ["b", "a", "b"].into_iter().collect();
        assert_eq!(credentials.scopes().collect::<Vec<_>>(), ["a", "b"]);

        credentials.grant("c");
        credentials.grant("c");
        assert!(credentials.contains("c"));
        assert_eq!(credentials.scopes().count(), 3);

        assert!(Credentials::default().is_empty());
    }

    #[tokio::test]
    async fn test_all_fail() {
        let backend = MultiBackend::new()
            .with(StaticBackend::new("first", None))
            .with(StaticBackend::new("second", None));

        assert!(backend.authenticate(&conn()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let backend = MultiBackend::<TestUser>::default();
        assert!(backend.is_empty());
        assert!(backend.authenticate(&conn()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = StaticBackend::new("first", None);
        let second = StaticBackend::new("second", Some(TestUser::new("root")));
        let third = StaticBackend::new("third", Some(TestUser::new("admin")));
        let third_calls = third.calls.clone();

        let backend = MultiBackend::new().with(first).with(second).with(third);
        assert_eq!(backend.len(), 3);

        let (credentials, user) = backend.authenticate(&conn()).await.unwrap().unwrap();
        assert_eq!(user, TestUser::new("root"));
        assert!(credentials.contains("second"));
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_order_decides() {
        let forwards = MultiBackend::new()
            .with(StaticBackend::new("a", Some(TestUser::new("alice"))))
            .with(StaticBackend::new("b", Some(TestUser::new("bob"))));
        let backwards = MultiBackend::new()
            .with(StaticBackend::new("b", Some(TestUser::new("bob"))))
            .with(StaticBackend::new("a", Some(TestUser::new("alice"))));

        let (_, user) = forwards.authenticate(&conn()).await.unwrap().unwrap();
        assert_eq!(user.identity(), "alice");

        let (_, user) = backwards.authenticate(&conn()).await.unwrap().unwrap();
        assert_eq!(user.identity(), "bob");
    }

    #[tokio::test]
    async fn test_error_propagates() {
        let backend = MultiBackend::new()
            .with(FailingBackend)
            .with(StaticBackend::new("second", Some(TestUser::new("root"))));

        assert!(matches!(
            backend.authenticate(&conn()).await,
            Err(Error::Loader(_))
        ));
    }

    #[test]
    fn test_debug_lists_names() {
        let backend = MultiBackend::new()
            .with(StaticBackend::new("session", None))
            .with(StaticBackend::new("remember-me", None));

        assert_eq!(format!("{backend:?}"), r#"["session", "remember-me"]"#);
    }
}
