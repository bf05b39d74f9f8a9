use std::sync::Arc;

use axum::http::Uri;
use tower_sessions::{MemoryStore, Session};

use crate::{Connection, Identity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestUser {
    pub name: String,
    pub pw_hash: Option<Vec<u8>>,
    pub scopes: Option<Vec<String>>,
}

impl TestUser {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            pw_hash: None,
            scopes: None,
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.pw_hash = Some(password.as_bytes().to_vec());
        self
    }

    pub fn with_scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = Some(scopes.iter().map(|scope| scope.to_string()).collect());
        self
    }
}

impl Identity for TestUser {
    fn identity(&self) -> String {
        self.name.clone()
    }

    fn password_hash(&self) -> Option<&[u8]> {
        self.pw_hash.as_deref()
    }

    fn scopes(&self) -> Option<Vec<String>> {
        self.scopes.clone()
    }
}

pub(crate) fn session() -> Session {
    Session::new(None, Arc::new(MemoryStore::default()), None)
}

pub(crate) fn conn() -> Connection {
    Connection::new(Uri::from_static("/"))
}
