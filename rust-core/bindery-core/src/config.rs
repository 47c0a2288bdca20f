//! # Binder Configuration
//!
//! Compile-time options shared by every binder built from one
//! [`BinderConfig`]: which tag to read, which body decoders exist, how strict
//! query parsing is, and how path variables are looked up.
//!
//! Services that keep their wiring in configuration files can deserialize a
//! [`Settings`] and turn it into a `BinderConfig` with
//! [`BinderConfig::from_settings`].

use crate::decoder::{Decoder, DecoderRegistry};
use crate::error::{BoxError, Error, Result};
use crate::path::{PathVars, PathVarsProvider};
use crate::request::Request;
use hyper::body::Body;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Tag key read when none is configured
pub const DEFAULT_TAG: &str = "bindery";

/// Default request body limit (1 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Options used when compiling model binders
#[derive(Clone)]
pub struct BinderConfig {
    tag: String,
    decoders: DecoderRegistry,
    default_content_type: Option<String>,
    reject_unknown_query_parameters: bool,
    path_vars: Option<PathVarsProvider>,
    max_body_size: usize,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            decoders: DecoderRegistry::new(),
            default_content_type: None,
            reject_unknown_query_parameters: false,
            path_vars: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl fmt::Debug for BinderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinderConfig")
            .field("tag", &self.tag)
            .field("decoders", &self.decoders)
            .field("default_content_type", &self.default_content_type)
            .field(
                "reject_unknown_query_parameters",
                &self.reject_unknown_query_parameters,
            )
            .field("path_vars", &self.path_vars.is_some())
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

impl BinderConfig {
    /// Configuration with no decoders and the `bindery` tag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read tags under `tag` instead of `bindery`
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Register the decoder for a request body content type
    ///
    /// Registered decoders also serve `content=` tags and take precedence
    /// over the built-ins there.
    #[must_use]
    pub fn with_decoder(mut self, content_type: impl Into<String>, decoder: Decoder) -> Self {
        self.decoders.insert(content_type, decoder);
        self
    }

    /// Content type assumed when a request has no `Content-Type` header
    #[must_use]
    pub fn with_default_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.default_content_type = Some(content_type.into());
        self
    }

    /// Reject query parameters (and struct keys) that no field binds
    #[must_use]
    pub fn reject_unknown_query_parameters(mut self, reject: bool) -> Self {
        self.reject_unknown_query_parameters = reject;
        self
    }

    /// Look up path variables with `provider`
    #[must_use]
    pub fn with_path_vars<F>(mut self, provider: F) -> Self
    where
        F: Fn(&Request) -> PathVars + Send + Sync + 'static,
    {
        self.path_vars = Some(Arc::new(provider));
        self
    }

    /// Cap request bodies read by [`BinderConfig::read_request`]
    #[must_use]
    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    /// Read path variables the host stored with [`Request::with_path_params`]
    #[must_use]
    pub fn with_route_params(self) -> Self {
        self.with_path_vars(|request| request.path_params().cloned().unwrap_or_default())
    }

    /// Build a configuration from deserialized settings
    ///
    /// # Errors
    ///
    /// Returns `Error::MissingDecoder` when a listed content type has no
    /// built-in decoder.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut config = Self::new()
            .with_tag(settings.tag.clone())
            .reject_unknown_query_parameters(settings.reject_unknown_query_parameters)
            .with_max_body_size(settings.max_body_size);
        if let Some(content_type) = &settings.default_content_type {
            config = config.with_default_content_type(content_type.clone());
        }
        for content_type in &settings.decoders {
            let decoder = Decoder::builtin(content_type).ok_or_else(|| Error::MissingDecoder {
                content_type: content_type.clone(),
            })?;
            config = config.with_decoder(content_type.clone(), decoder);
        }
        Ok(config)
    }

    /// Tag key fields are read from
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Registered body decoders
    #[must_use]
    pub const fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Content type used for bodies without a `Content-Type` header
    #[must_use]
    pub fn default_content_type(&self) -> Option<&str> {
        self.default_content_type.as_deref()
    }

    /// Whether unknown query parameters are errors
    #[must_use]
    pub const fn rejects_unknown_query_parameters(&self) -> bool {
        self.reject_unknown_query_parameters
    }

    /// Path variable lookup, if configured
    #[must_use]
    pub const fn path_vars(&self) -> Option<&PathVarsProvider> {
        self.path_vars.as_ref()
    }

    /// Body size limit applied by [`BinderConfig::read_request`]
    #[must_use]
    pub const fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Buffer a hyper request, enforcing the configured body size limit
    ///
    /// # Errors
    ///
    /// Same as [`Request::from_hyper_with_limit`].
    pub async fn read_request<B>(&self, req: http::Request<B>) -> Result<Request>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        Request::from_hyper_with_limit(req, self.max_body_size).await
    }
}

/// Serializable binder settings
///
/// ```toml
/// [binder]
/// tag = "bindery"
/// default_content_type = "application/json"
/// reject_unknown_query_parameters = true
/// decoders = ["application/json", "application/xml"]
/// max_body_size = 1048576
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Tag key fields are read from
    pub tag: String,
    /// Content type assumed for bodies without `Content-Type`
    pub default_content_type: Option<String>,
    /// Reject query parameters no field binds
    pub reject_unknown_query_parameters: bool,
    /// Built-in body decoders to register, by content type
    pub decoders: Vec<String>,
    /// Body size limit applied by [`BinderConfig::read_request`]
    pub max_body_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tag: DEFAULT_TAG.to_string(),
            default_content_type: None,
            reject_unknown_query_parameters: false,
            decoders: Vec::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}
