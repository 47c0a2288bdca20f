//! # HTTP Request
//!
//! Owned view of an incoming request, the input of every binder.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Request only carries request data; decoding lives in binders
//! - **O**: Extensible via new methods without breaking changes
//! - **D**: Built from plain `http` types, so any hyper-based server can feed it
//!
//! The body is read completely before binding. Use
//! [`Request::from_hyper_with_limit`] to cap how much is buffered.

use crate::error::{BoxError, Error, Result};
use crate::path::PathVars;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method};
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};

/// HTTP request as seen by the binder
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: Method,
    path: String,
    query_string: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    path_params: Option<PathVars>,
}

impl Request {
    /// Create a request for `target` (`/path?query`), without headers or body
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query_string,
            ..Self::default()
        }
    }

    /// Add a header value, keeping earlier values of the same header
    ///
    /// Invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(n, v);
        }
        self
    }

    /// Replace the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach route parameters resolved by the host's router
    #[must_use]
    pub fn with_path_params(mut self, params: PathVars) -> Self {
        self.path_params = Some(params);
        self
    }

    /// Create from an `http` request whose body is already buffered
    #[must_use]
    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query_string: parts.uri.query().map(String::from),
            headers: parts.headers,
            body,
            path_params: None,
        }
    }

    /// Create from a hyper request, reading the whole body
    ///
    /// # Errors
    ///
    /// Returns `Error::ReadBody` if the body stream fails.
    pub async fn from_hyper<B>(req: http::Request<B>) -> Result<Self>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        Self::from_hyper_with_limit(req, usize::MAX).await
    }

    /// Create from a hyper request with body size limit
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when `Content-Length` or the received
    /// body exceeds `max_body_size`, and `Error::ReadBody` if the body stream
    /// fails.
    pub async fn from_hyper_with_limit<B>(req: http::Request<B>, max_body_size: usize) -> Result<Self>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();

        if let Some(content_len) = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok())
        {
            if content_len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: content_len,
                });
            }
        }

        let body = BodyExt::collect(body)
            .await
            .map_err(|e| Error::ReadBody(e.into()))?
            .to_bytes();
        if body.len() > max_body_size {
            return Err(Error::PayloadTooLarge {
                limit: max_body_size,
                actual: body.len(),
            });
        }

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query_string: parts.uri.query().map(String::from),
            headers: parts.headers,
            body,
            path_params: None,
        })
    }

    /// HTTP method
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Request path (without query string)
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Decoded query parameters, grouped by key in order of appearance
    #[must_use]
    pub fn query(&self) -> QueryValues {
        self.query_string
            .as_deref()
            .map(|q| QueryValues::parse(q.as_bytes()))
            .unwrap_or_default()
    }

    /// Request headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// `Content-Type` header, if present and non-empty
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| !ct.is_empty())
    }

    /// Request body
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Route parameters attached by the host
    #[must_use]
    pub const fn path_params(&self) -> Option<&PathVars> {
        self.path_params.as_ref()
    }
}

/// URL-encoded parameters grouped by key
///
/// Keys keep the order of their first appearance; values keep their order
/// within a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    entries: Vec<(String, Vec<String>)>,
}

impl QueryValues {
    /// Parse `application/x-www-form-urlencoded` data
    ///
    /// `+` decodes to a space and percent escapes are decoded.
    #[must_use]
    pub fn parse(input: &[u8]) -> Self {
        let mut values = Self::default();
        for (key, value) in form_urlencoded::parse(input) {
            values.push(key.into_owned(), value.into_owned());
        }
        values
    }

    fn push(&mut self, key: String, value: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, values)) => values.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// All values of a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, values)| values.as_slice())
    }

    /// First value of a key
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(<[String]>::first)
            .map(String::as_str)
    }

    /// Keys with their values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Number of distinct keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
