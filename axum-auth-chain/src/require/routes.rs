use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

// from https://github.com/tokio-rs/axum/blob/7219fd8df520d295faa42b59f77e25ca2818b6b1/axum-extra/src/lib.rs#L91
// which in turn is from https://github.com/servo/rust-url/blob/master/url/src/parser.rs
const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');
const PATH: &AsciiSet = &FRAGMENT.add(b'#').add(b'?').add(b'{').add(b'}');
const PATH_SEGMENT: &AsciiSet = &PATH.add(b'/').add(b'%');

/// Errors raised while resolving a named route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// No route is registered under this name.
    #[error("no route named `{0}`")]
    NoRoute(String),

    /// The route template has a parameter no value was given for.
    #[error("route `{route}` needs a value for `{param}`")]
    MissingParam {
        /// Name of the route.
        route: String,
        /// Name of the parameter.
        param: String,
    },
}

/// Maps route names to path templates.
///
/// Templates use axum's syntax: a segment is either literal, a parameter
/// (`:id` or `{id}`), or a trailing wildcard (`*rest` or `{*rest}`).
///
/// ```rust
/// use std::collections::HashMap;
///
/// use axum_auth_chain::RouteTable;
///
/// let routes = RouteTable::new().with_route("login", "/security/login/{id}");
/// let params = HashMap::from([("id".to_owned(), "1".to_owned())]);
///
/// assert_eq!(routes.url_path_for("login", &params).unwrap(), "/security/login/1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, String>,
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `template` under `name`, replacing any previous template.
    pub fn with_route(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.insert(name, template);
        self
    }

    /// Registers `template` under `name`, replacing any previous template.
    pub fn insert(&mut self, name: impl Into<String>, template: impl Into<String>) {
        self.routes.insert(name.into(), template.into());
    }

    /// Builds the path of the route `name`, percent-encoding each parameter.
    pub fn url_path_for(
        &self,
        name: &str,
        params: &HashMap<String, String>,
    ) -> Result<String, RouteError> {
        let template = self
            .routes
            .get(name)
            .ok_or_else(|| RouteError::NoRoute(name.to_owned()))?;

        let segments = template
            .split('/')
            .map(|segment| -> Result<String, RouteError> {
                let (param, set) = match Segment::parse(segment) {
                    Segment::Literal => return Ok(segment.to_owned()),
                    Segment::Param(param) => (param, PATH_SEGMENT),
                    Segment::Wildcard(param) => (param, PATH),
                };

                let value = params.get(param).ok_or_else(|| RouteError::MissingParam {
                    route: name.to_owned(),
                    param: param.to_owned(),
                })?;

                Ok(utf8_percent_encode(value, set).to_string())
            })
            .collect::<Result<Vec<_>, RouteError>>()?;

        Ok(segments.join("/"))
    }
}

enum Segment<'a> {
    Literal,
    Param(&'a str),
    Wildcard(&'a str),
}

impl<'a> Segment<'a> {
    fn parse(segment: &'a str) -> Self {
        let name = segment
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .or_else(|| segment.strip_prefix(':'));

        match name {
            Some(name) => match name.strip_prefix('*') {
                Some(name) => Self::Wildcard(name),
                None => Self::Param(name),
            },
            None => match segment.strip_prefix('*') {
                Some(name) => Self::Wildcard(name),
                None => Self::Literal,
            },
        }
    }
}
