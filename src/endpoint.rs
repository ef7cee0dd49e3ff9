use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("base URL has no host: {0}")]
    MissingHost(String),

    #[error("ingestion URL is invalid: {0}")]
    Invalid(#[from] url::ParseError),
}

/// Build the multi-record ingestion URL:
/// `<scheme>://<host><path>/api/<organization>/<stream>/_multi`.
///
/// The base path keeps its segments minus any trailing slash; query and
/// fragment are dropped.
pub fn ingest_url(base: &Url, organization: &str, stream: &str) -> Result<Url, EndpointError> {
    let host = base
        .host_str()
        .ok_or_else(|| EndpointError::MissingHost(base.to_string()))?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    let path = base.path().trim_end_matches('/');

    let raw = format!(
        "{}://{authority}{path}/api/{organization}/{stream}/_multi",
        base.scheme()
    );
    Ok(Url::parse(&raw)?)
}

/// Username/password pair sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        let token = BASE64.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
