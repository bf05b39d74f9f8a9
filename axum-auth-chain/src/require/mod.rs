//! Gating routes behind a login.

mod routes;
mod service;

use std::{collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use axum::http::{self, HeaderValue, Uri};
use tower_layer::Layer;

pub use self::{
    routes::{RouteError, RouteTable},
    service::LoginRequired,
};
use crate::Error;

const DEFAULT_LOGIN_ROUTE: &str = "login";
const DEFAULT_REDIRECT_FIELD: &str = "next";

#[derive(Debug, Clone)]
enum LoginTarget {
    Url(String),
    Route {
        name: String,
        params: HashMap<String, String>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct LoginRedirect {
    target: LoginTarget,
    routes: RouteTable,
    redirect_field: String,
}

impl LoginRedirect {
    /// Resolves the login location for a request to `next`.
    pub(crate) fn location(&self, next: &str) -> Result<HeaderValue, Error> {
        let login_url = match self.target {
            LoginTarget::Url(ref url) => url.clone(),
            LoginTarget::Route {
                ref name,
                ref params,
            } => self.routes.url_path_for(name, params)?,
        };

        let uri = url_with_redirect_query(&login_url, &self.redirect_field, next)?;
        Ok(HeaderValue::try_from(uri.to_string())?)
    }
}

/// Appends `redirect_field=<next>` to the query of `url`.
///
/// A `url` whose query already has `redirect_field` is returned unchanged.
pub(crate) fn url_with_redirect_query(
    url: &str,
    redirect_field: &str,
    next: &str,
) -> Result<Uri, http::Error> {
    let uri = url.parse::<Uri>()?;
    let query = uri.query().filter(|query| !query.is_empty());

    if query.is_some_and(|query| {
        form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == redirect_field)
    }) {
        return Ok(uri);
    }

    let redirect_query = format!(
        "{}={}",
        urlencoding::encode(redirect_field),
        urlencoding::encode(next)
    );
    let path_and_query = match query {
        Some(query) => format!("{}?{query}&{redirect_query}", uri.path()),
        None => format!("{}?{redirect_query}", uri.path()),
    };

    let mut parts = uri.into_parts();
    parts.path_and_query = Some(path_and_query.parse()?);

    Ok(Uri::from_parts(parts)?)
}

/// A layer redirecting unauthenticated requests to a login page.
///
/// The login location is, in order of preference, an explicit
/// [`with_login_url`](Self::with_login_url), a named route set with
/// [`with_route`](Self::with_route), or the route named `login`. Named routes
/// are resolved through the [`RouteTable`] given to
/// [`with_routes`](Self::with_routes).
///
/// The original path and query are passed to the login page in the redirect
/// field, `next` unless configured otherwise. Requests which are not HTTP or
/// WebSocket connections, see [`ConnectionKind`](crate::ConnectionKind), are
/// passed through untouched.
///
/// The layer reads the [`AuthSession`](crate::AuthSession) provided by
/// [`AuthManagerLayer`](crate::AuthManagerLayer), which must therefore wrap
/// it.
///
/// ```rust
/// use axum::{routing::get, Router};
/// use axum_auth_chain::{LoginRequiredLayer, RouteTable};
///
/// # #[derive(Debug, Clone)]
/// # struct User;
/// # impl axum_auth_chain::Identity for User {
/// #     fn identity(&self) -> String {
/// #         "ferris".to_owned()
/// #     }
/// # }
/// let routes = RouteTable::new().with_route("login", "/security/login/{id}");
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { "Hello, world!" }))
///     .route_layer(
///         LoginRequiredLayer::<User>::new()
///             .with_routes(routes)
///             .with_route("login", [("id", "1")]),
///     );
/// ```
pub struct LoginRequiredLayer<User> {
    redirect: LoginRedirect,
    _user: PhantomData<fn() -> User>,
}

impl<User> LoginRequiredLayer<User> {
    /// Creates a layer redirecting to the route named `login`.
    pub fn new() -> Self {
        Self {
            redirect: LoginRedirect {
                target: LoginTarget::Route {
                    name: DEFAULT_LOGIN_ROUTE.to_owned(),
                    params: HashMap::new(),
                },
                routes: RouteTable::new(),
                redirect_field: DEFAULT_REDIRECT_FIELD.to_owned(),
            },
            _user: PhantomData,
        }
    }

    /// Redirect to a fixed URL. Takes precedence over named routes.
    pub fn with_login_url(mut self, login_url: impl Into<String>) -> Self {
        self.redirect.target = LoginTarget::Url(login_url.into());
        self
    }

    /// Redirect to the route `name`, filling its path with `params`.
    pub fn with_route<I, K, V>(mut self, name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if let LoginTarget::Route { .. } = self.redirect.target {
            self.redirect.target = LoginTarget::Route {
                name: name.into(),
                params: params
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            };
        }
        self
    }

    /// Configure the routes named logins are resolved against.
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.redirect.routes = routes;
        self
    }

    /// Configure the query parameter holding the original location. If not
    /// configured it will default to "next".
    pub fn with_redirect_field(mut self, redirect_field: impl Into<String>) -> Self {
        self.redirect.redirect_field = redirect_field.into();
        self
    }
}

impl<User> Default for LoginRequiredLayer<User> {
    fn default() -> Self {
        Self::new()
    }
}

impl<User> Clone for LoginRequiredLayer<User> {
    fn clone(&self) -> Self {
        Self {
            redirect: self.redirect.clone(),
            _user: PhantomData,
        }
    }
}

impl<User> fmt::Debug for LoginRequiredLayer<User> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequiredLayer")
            .field("redirect", &self.redirect)
            .finish()
    }
}

impl<S, User> Layer<S> for LoginRequiredLayer<User> {
    type Service = LoginRequired<S, User>;

    fn layer(&self, inner: S) -> Self::Service {
        LoginRequired::new(inner, Arc::new(self.redirect.clone()))
    }
}
