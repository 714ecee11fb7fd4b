use std::time::Duration;

use bytes::Bytes;

use super::util::{has_header, split_header};
use super::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn body_utf8(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl restbench_core::Response for HttpResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

/// Request template. Cloned once per attempt by [`crate::HttpWorkFactory`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: http::Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(http::Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self::new(http::Method::POST, url).with_body(body)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds `Authorization: Bearer <token>` unless an authorization header is already set.
    #[must_use]
    pub fn with_bearer(self, token: &str) -> Self {
        if has_header(&self.headers, "authorization") {
            return self;
        }
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    /// Checks everything that can be rejected without touching the network.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url).map_err(|_| Error::InvalidUrl(self.url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(self.url.clone()));
        }
        if parsed.host_str().is_none() {
            return Err(Error::InvalidUrl(self.url.clone()));
        }

        for (k, v) in &self.headers {
            http::header::HeaderName::from_bytes(k.as_bytes())?;
            http::header::HeaderValue::from_str(v)?;
        }
        Ok(())
    }
}

/// Parses a `KEY:VALUE` header argument.
pub fn parse_header_spec(spec: &str) -> Result<(String, String)> {
    split_header(spec).ok_or_else(|| Error::HeaderSpec(spec.to_string()))
}
