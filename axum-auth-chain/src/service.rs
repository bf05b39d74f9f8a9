use std::{
    fmt,
    sync::Arc,
    task::{Context, Poll},
};

use axum::http::{self, Request, Response};
use futures::future::BoxFuture;
use tower_cookies::CookieManager;
use tower_layer::Layer;
use tower_service::Service;
use tower_sessions::{
    service::{CookieController, PlaintextCookie},
    SessionManager, SessionManagerLayer, SessionStore,
};
use tracing::Instrument;

use crate::{signing::Signer, AuthBackend, AuthSession, Connection, Identity};

/// A middleware that authenticates every request and provides
/// [`AuthSession`] as a request extension.
pub struct AuthManager<S, Backend> {
    inner: S,
    backend: Arc<Backend>,
    signer: Signer,
}

impl<S: Clone, Backend> Clone for AuthManager<S, Backend> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            backend: self.backend.clone(),
            signer: self.signer.clone(),
        }
    }
}

impl<S: fmt::Debug, Backend: AuthBackend> fmt::Debug for AuthManager<S, Backend> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("inner", &self.inner)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl<ReqBody, ResBody, S, Backend> Service<Request<ReqBody>> for AuthManager<S, Backend>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send,
    Backend: AuthBackend + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let span = tracing::info_span!(
            "authenticate",
            backend = self.backend.name(),
            user.id = tracing::field::Empty
        );

        let backend = self.backend.clone();
        let signer = self.signer.clone();

        // Because the inner service can panic until ready, we need to ensure we only
        // use the ready service.
        //
        // See: https://docs.rs/tower/latest/tower/trait.Service.html#be-careful-when-cloning-inner-services
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(
            async move {
                let conn = Connection::from_request(&req);

                let authenticated = match backend.authenticate(&conn).await {
                    Ok(authenticated) => authenticated,
                    Err(err) => {
                        tracing::error!(err = %err, "could not authenticate request");
                        let mut res = Response::default();
                        *res.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
                        return Ok(res);
                    }
                };

                if let Some((_, ref user)) = authenticated {
                    tracing::Span::current().record("user.id", user.identity());
                }

                let auth_session =
                    AuthSession::new(conn.session().cloned(), signer, authenticated);
                req.extensions_mut().insert(auth_session);

                inner.call(req).await
            }
            .instrument(span),
        )
    }
}

/// A layer for providing [`AuthSession`] as a request extension.
///
/// The layer wraps the given [`SessionManagerLayer`], so sessions are loaded
/// before the backend runs and saved once the response is produced.
pub struct AuthManagerLayer<
    Backend: AuthBackend,
    Sessions: SessionStore,
    C: CookieController = PlaintextCookie,
> {
    backend: Arc<Backend>,
    signer: Signer,
    session_manager_layer: SessionManagerLayer<Sessions, C>,
}

impl<Backend: AuthBackend, Sessions: SessionStore, C: CookieController>
    AuthManagerLayer<Backend, Sessions, C>
{
    /// Create a new [`AuthManagerLayer`] running `backend` on each request.
    ///
    /// `signer` is used to log users in and must be the one the backend was
    /// created with.
    pub fn new(
        backend: Backend,
        signer: &Signer,
        session_manager_layer: SessionManagerLayer<Sessions, C>,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            signer: signer.clone(),
            session_manager_layer,
        }
    }
}

impl<Backend, Sessions, C> Clone for AuthManagerLayer<Backend, Sessions, C>
where
    Backend: AuthBackend,
    Sessions: SessionStore,
    C: CookieController,
    SessionManagerLayer<Sessions, C>: Clone,
{
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            signer: self.signer.clone(),
            session_manager_layer: self.session_manager_layer.clone(),
        }
    }
}

impl<Backend: AuthBackend, Sessions: SessionStore, C: CookieController> fmt::Debug
    for AuthManagerLayer<Backend, Sessions, C>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManagerLayer")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl<S, Backend: AuthBackend, Sessions: SessionStore, C: CookieController> Layer<S>
    for AuthManagerLayer<Backend, Sessions, C>
{
    type Service = CookieManager<SessionManager<AuthManager<S, Backend>, Sessions, C>>;

    fn layer(&self, inner: S) -> Self::Service {
        let auth_manager = AuthManager {
            inner,
            backend: self.backend.clone(),
            signer: self.signer.clone(),
        };

        self.session_manager_layer.layer(auth_manager)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use async_trait::async_trait;
    use axum::{body::Body, http::StatusCode};
    use tower::{service_fn, ServiceExt};
    use tower_sessions::MemoryStore;

    use super::*;
    use crate::{
        backend::{Authenticated, Credentials},
        test_support::TestUser,
        Error,
    };

    /// Authenticates `?user=<name>`.
    struct QueryBackend;

    #[async_trait]
    impl AuthBackend for QueryBackend {
        type User = TestUser;

        async fn authenticate(
            &self,
            conn: &Connection,
        ) -> Result<Option<Authenticated<TestUser>>, Error> {
            Ok(conn
                .query_param("user")
                .map(|name| (Credentials::new(["query"]), TestUser::new(&name))))
        }

        fn name(&self) -> &'static str {
            "query"
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl AuthBackend for BrokenBackend {
        type User = TestUser;

        async fn authenticate(
            &self,
            _: &Connection,
        ) -> Result<Option<Authenticated<TestUser>>, Error> {
            Err(Error::loader("user database is unreachable"))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn signer() -> Signer {
        Signer::new(b"key!").unwrap()
    }

    async fn whoami(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let auth_session = req
            .extensions()
            .get::<AuthSession<TestUser>>()
            .expect("auth session should be inserted");
        assert!(auth_session.session().is_some());

        let body = match auth_session.user {
            Some(ref user) => user.identity(),
            None => "anonymous".to_owned(),
        };
        Ok(Response::new(Body::from(body)))
    }

    async fn body_text(res: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_inserts_auth_session() {
        let layer = AuthManagerLayer::new(
            QueryBackend,
            &signer(),
            SessionManagerLayer::new(MemoryStore::default()),
        );
        let svc = layer.layer(service_fn(whoami));

        let res = svc.clone().oneshot(request("/?user=root")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "root");

        let res = svc.oneshot(request("/")).await.unwrap();
        assert_eq!(body_text(res).await, "anonymous");
    }

    #[tokio::test]
    async fn test_backend_error_is_internal_server_error() {
        let layer = AuthManagerLayer::new(
            BrokenBackend,
            &signer(),
            SessionManagerLayer::new(MemoryStore::default()),
        );
        let svc = layer.layer(service_fn(whoami));

        let res = svc.oneshot(request("/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_debug_names_backend() {
        let layer = AuthManagerLayer::new(
            QueryBackend,
            &signer(),
            SessionManagerLayer::new(MemoryStore::default()),
        );
        assert!(format!("{layer:?}").contains("query"));
    }
}
