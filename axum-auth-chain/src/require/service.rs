use std::{
    fmt,
    future::ready,
    marker::PhantomData,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    extract::OriginalUri,
    http::{header, uri::PathAndQuery, Request, Response, StatusCode},
};
use futures::future::BoxFuture;
use tower_service::Service;

use super::LoginRedirect;
use crate::{AuthSession, ConnectionKind, Identity};

/// A middleware that redirects unauthenticated requests to a login page.
///
/// See [`LoginRequiredLayer`](super::LoginRequiredLayer).
pub struct LoginRequired<S, User> {
    inner: S,
    redirect: Arc<LoginRedirect>,
    _user: PhantomData<fn() -> User>,
}

impl<S, User> LoginRequired<S, User> {
    pub(crate) fn new(inner: S, redirect: Arc<LoginRedirect>) -> Self {
        Self {
            inner,
            redirect,
            _user: PhantomData,
        }
    }

    fn redirect_response<ReqBody, ResBody: Default>(
        &self,
        req: &Request<ReqBody>,
    ) -> Response<ResBody> {
        let original_uri = match req.extensions().get::<OriginalUri>() {
            Some(OriginalUri(uri)) => uri,
            None => req.uri(),
        };
        let next = original_uri
            .path_and_query()
            .map(PathAndQuery::as_str)
            .unwrap_or("/");

        match self.redirect.location(next) {
            Ok(location) => {
                tracing::debug!(next, ?location, "redirecting to login");
                let mut res = Response::default();
                *res.status_mut() = StatusCode::FOUND;
                res.headers_mut().insert(header::LOCATION, location);
                res
            }
            Err(err) => {
                tracing::error!(err = %err, "could not resolve login location");
                internal_server_error()
            }
        }
    }
}

fn internal_server_error<ResBody: Default>() -> Response<ResBody> {
    let mut res = Response::default();
    *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    res
}

impl<S: Clone, User> Clone for LoginRequired<S, User> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            redirect: self.redirect.clone(),
            _user: PhantomData,
        }
    }
}

impl<S: fmt::Debug, User> fmt::Debug for LoginRequired<S, User> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequired")
            .field("inner", &self.inner)
            .field("redirect", &self.redirect)
            .finish()
    }
}

impl<S, User, ReqBody, ResBody> Service<Request<ReqBody>> for LoginRequired<S, User>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ResBody: Default + Send + 'static,
    User: Identity,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        if !ConnectionKind::of(&req).is_connection() {
            return Box::pin(self.inner.call(req));
        }

        let authenticated = req
            .extensions()
            .get::<AuthSession<User>>()
            .map(AuthSession::is_authenticated);

        match authenticated {
            Some(true) => Box::pin(self.inner.call(req)),
            Some(false) => Box::pin(ready(Ok(self.redirect_response(&req)))),
            None => {
                tracing::error!("auth session not found in request extensions");
                Box::pin(ready(Ok(internal_server_error())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use async_trait::async_trait;
    use axum::{body::Body, routing::get, Router};
    use tower::{service_fn, ServiceExt};
    use tower_layer::Layer;
    use tower_sessions::{MemoryStore, SessionManagerLayer};

    use super::*;
    use crate::{
        signing::Signer, test_support::TestUser, AuthBackend, AuthManagerLayer, Authenticated,
        Connection, Credentials, Error, LoginRequiredLayer, RouteTable,
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
                .map(|name| (Credentials::default(), TestUser::new(&name))))
        }

        fn name(&self) -> &'static str {
            "query"
        }
    }

    fn auth_layer() -> AuthManagerLayer<QueryBackend, MemoryStore> {
        let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);
        AuthManagerLayer::new(QueryBackend, &Signer::new(b"key!").unwrap(), session_layer)
    }

    fn app(login_required: LoginRequiredLayer<TestUser>) -> Router {
        Router::new()
            .route("/", get(|| async { "Hello, world!" }))
            .route_layer(login_required)
            .layer(auth_layer())
    }

    fn security_routes() -> RouteTable {
        RouteTable::new().with_route("login", "/security/login/{id}")
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn location(res: &Response<Body>) -> &str {
        res.headers()
            .get(header::LOCATION)
            .unwrap()
            .to_str()
            .unwrap()
    }

    async fn ok(_: Request<Body>) -> Result<Response<Body>, Infallible> {
        Ok(Response::new(Body::from("downstream")))
    }

    #[tokio::test]
    async fn test_redirects_to_named_route() {
        let layer = LoginRequiredLayer::new()
            .with_routes(security_routes())
            .with_route("login", [("id", "1")]);

        let res = app(layer).oneshot(request("/")).await.unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/security/login/1?next=%2F");
    }

    #[tokio::test]
    async fn test_next_keeps_query() {
        let layer = LoginRequiredLayer::new().with_login_url("/login");

        let res = app(layer).oneshot(request("/?tab=2")).await.unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/login?next=%2F%3Ftab%3D2");
    }

    #[tokio::test]
    async fn test_next_is_original_uri_of_nested_router() {
        let admin = Router::new()
            .route("/reports", get(|| async { "reports" }))
            .route_layer(LoginRequiredLayer::<TestUser>::new().with_login_url("/login"));
        let app = Router::new().nest("/admin", admin).layer(auth_layer());

        let res = app.oneshot(request("/admin/reports")).await.unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/login?next=%2Fadmin%2Freports");
    }

    #[tokio::test]
    async fn test_authenticated_passes_through() {
        let layer = LoginRequiredLayer::new().with_login_url("/login");

        let res = app(layer).oneshot(request("/?user=root")).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unauthenticated_identity_is_redirected() {
        #[derive(Debug, Clone)]
        struct Anonymous;

        impl Identity for Anonymous {
            fn identity(&self) -> String {
                "anonymous".to_owned()
            }

            fn is_authenticated(&self) -> bool {
                false
            }
        }

        let mut req = request("/");
        req.extensions_mut().insert(AuthSession::new(
            None,
            Signer::new(b"key!").unwrap(),
            Some((Credentials::default(), Anonymous)),
        ));

        let svc = LoginRequiredLayer::<Anonymous>::new()
            .with_login_url("/login")
            .layer(service_fn(ok));
        let res = svc.oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
    }

    #[tokio::test]
    async fn test_non_connection_passes_through() {
        // No auth session: anything but a pass-through would fail.
        let mut req = request("/");
        req.extensions_mut().insert(ConnectionKind::Other);

        let svc = LoginRequiredLayer::<TestUser>::new().layer(service_fn(ok));
        let res = svc.oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_websocket_is_gated() {
        let req = Request::builder()
            .uri("/chat")
            .header(header::UPGRADE, "websocket")
            .extension(AuthSession::<TestUser>::new(
                None,
                Signer::new(b"key!").unwrap(),
                None,
            ))
            .body(Body::empty())
            .unwrap();

        let svc = LoginRequiredLayer::<TestUser>::new()
            .with_login_url("/login")
            .layer(service_fn(ok));
        let res = svc.oneshot(req).await.unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        assert_eq!(location(&res), "/login?next=%2Fchat");
    }

    #[tokio::test]
    async fn test_missing_auth_session() {
        let svc = LoginRequiredLayer::<TestUser>::new().layer(service_fn(ok));
        let res = svc.oneshot(request("/")).await.unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unresolvable_route() {
        let res = app(LoginRequiredLayer::new())
            .oneshot(request("/"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
