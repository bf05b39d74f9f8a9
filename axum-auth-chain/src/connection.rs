use std::convert::Infallible;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{
        header::{self, AsHeaderName},
        request::Parts,
        uri::Scheme,
        Extensions, HeaderMap, HeaderName, HeaderValue, Request, Uri,
    },
};
use tower_cookies::cookie::Cookie;
use tower_sessions::Session;

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// The kind of event a request represents.
///
/// Most requests are plain HTTP. Layers bridging other event sources into a
/// tower stack may tag requests with [`ConnectionKind::Other`] by inserting it
/// as a request extension; such requests are not subject to login gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// A regular HTTP request.
    Http,
    /// A request asking to be upgraded to a WebSocket.
    WebSocket,
    /// Anything that is not a client connection, e.g. lifecycle events.
    Other,
}

impl ConnectionKind {
    /// Determines the kind of `req`, preferring an explicit extension.
    pub fn of<B>(req: &Request<B>) -> Self {
        Self::from_parts(req.extensions(), req.headers())
    }

    fn from_parts(extensions: &Extensions, headers: &HeaderMap) -> Self {
        if let Some(kind) = extensions.get::<ConnectionKind>() {
            return *kind;
        }

        let upgrade = headers
            .get(header::UPGRADE)
            .and_then(|value| value.to_str().ok());

        if upgrade.is_some_and(|value| value.eq_ignore_ascii_case("websocket")) {
            Self::WebSocket
        } else {
            Self::Http
        }
    }

    /// Whether this is an HTTP or WebSocket connection.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Http | Self::WebSocket)
    }
}

/// A read-only view of the current request, as seen by backends.
///
/// Holds the URI, headers and, when the session layer is installed, the
/// request's [`Session`].
#[derive(Debug, Clone)]
pub struct Connection {
    uri: Uri,
    headers: HeaderMap,
    session: Option<Session>,
    kind: ConnectionKind,
}

impl Connection {
    /// Creates a connection for `uri` with no headers and no session.
    pub fn new(uri: Uri) -> Self {
        Self {
            uri,
            headers: HeaderMap::new(),
            session: None,
            kind: ConnectionKind::Http,
        }
    }

    /// Captures the parts of `req` backends need.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self::from_parts(req.uri(), req.headers(), req.extensions())
    }

    fn from_parts(uri: &Uri, headers: &HeaderMap, extensions: &Extensions) -> Self {
        Self {
            uri: uri.clone(),
            headers: headers.clone(),
            session: extensions.get::<Session>().cloned(),
            kind: ConnectionKind::from_parts(extensions, headers),
        }
    }

    /// Attaches a session.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Appends a header.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Appends a `Cookie` header holding a single cookie.
    pub fn with_cookie(self, name: &str, value: &str) -> Result<Self, header::InvalidHeaderValue> {
        let value = HeaderValue::try_from(Cookie::new(name, value).to_string())?;
        Ok(self.with_header(header::COOKIE, value))
    }

    /// The request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The kind of connection.
    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// The session, if a session layer is installed.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns a header value, if present and valid UTF-8.
    pub fn header(&self, name: impl AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns the first value of the query parameter `name`, decoded.
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Returns the value of the request cookie `name`.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| Cookie::parse(pair.trim()).ok())
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_owned())
    }

    /// Whether the request arrived over HTTPS, directly or behind a proxy.
    pub fn is_secure(&self) -> bool {
        self.uri.scheme() == Some(&Scheme::HTTPS)
            || self
                .header(X_FORWARDED_PROTO)
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }
}

/// Handlers extract the current [`Connection`], e.g. to pass it to
/// [`remember_me`](crate::remember_me::remember_me).
#[async_trait]
impl<S> FromRequestParts<S> for Connection
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(&parts.uri, &parts.headers, &parts.extensions))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;
    use crate::test_support::session;

    #[test]
    fn test_query_param() {
        let conn = Connection::new(Uri::from_static("/?login&next=%2Fhome&next=%2Fother"));

        assert_eq!(conn.query_param("login").as_deref(), Some(""));
        assert_eq!(conn.query_param("next").as_deref(), Some("/home"));
        assert_eq!(conn.query_param("missing"), None);
        assert_eq!(Connection::new(Uri::from_static("/")).query_param("next"), None);
    }

    #[test]
    fn test_cookie() {
        let conn = Connection::new(Uri::from_static("/"))
            .with_header(header::COOKIE, HeaderValue::from_static("id=abc; theme=dark"))
            .with_cookie("remember_me", "token.value")
            .unwrap();

        assert_eq!(conn.cookie("id").as_deref(), Some("abc"));
        assert_eq!(conn.cookie("theme").as_deref(), Some("dark"));
        assert_eq!(conn.cookie("remember_me").as_deref(), Some("token.value"));
        assert_eq!(conn.cookie("missing"), None);
    }

    #[test]
    fn test_is_secure() {
        assert!(!Connection::new(Uri::from_static("/")).is_secure());
        assert!(Connection::new(Uri::from_static("https://example.com/")).is_secure());

        let proxied = Connection::new(Uri::from_static("/"))
            .with_header(X_FORWARDED_PROTO, HeaderValue::from_static("HTTPS"));
        assert!(proxied.is_secure());
    }

    #[test]
    fn test_from_request() {
        let mut req = Request::builder()
            .uri("/chat?room=1")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();
        req.extensions_mut().insert(session());

        let conn = Connection::from_request(&req);
        assert_eq!(conn.kind(), ConnectionKind::WebSocket);
        assert_eq!(conn.uri().path(), "/chat");
        assert_eq!(conn.query_param("room").as_deref(), Some("1"));
        assert!(conn.session().is_some());
    }

    #[tokio::test]
    async fn test_extract() {
        let req = Request::builder()
            .uri("https://example.com/login?user=root")
            .body(Body::empty())
            .unwrap();
        let (mut parts, _) = req.into_parts();

        let conn = Connection::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(conn.is_secure());
        assert_eq!(conn.kind(), ConnectionKind::Http);
        assert_eq!(conn.query_param("user").as_deref(), Some("root"));
    }

    #[test]
    fn test_connection_kind() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        assert_eq!(ConnectionKind::of(&req), ConnectionKind::Http);
        assert!(ConnectionKind::of(&req).is_connection());

        let mut req = Request::builder().uri("/").body(Body::empty()).unwrap();
        req.extensions_mut().insert(ConnectionKind::Other);
        assert_eq!(ConnectionKind::of(&req), ConnectionKind::Other);
        assert!(!ConnectionKind::Other.is_connection());
    }
}
