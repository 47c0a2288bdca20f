//! # Error Handling
//!
//! Centralized error types for bindery.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Errors fall in two groups:
//!
//! - **Wiring errors** (`TagParse`, `UnsupportedType`, `DuplicateModel`,
//!   `DuplicateName`, `MissingPathVars`, `MissingDecoder`,
//!   `BinderUnavailable`) are returned while a binder is compiled and abort
//!   service startup.
//! - **Request errors** (`Decode`, `Body`, `UnknownParameter`,
//!   `UnsupportedContentType`) are caused by the client and surface as a
//!   [`Rejection`] carrying `400 Bad Request`.

use crate::tag::Base;
use http::StatusCode;
use thiserror::Error;

/// Result type alias for bindery operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause used for failures raised by decoders and `FromStr` impls
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Core error types for bindery
#[derive(Error, Debug)]
pub enum Error {
    /// A field tag could not be parsed or combines options illegally
    #[error("invalid tag `{tag}`: {reason}")]
    TagParse {
        /// The offending tag string
        tag: String,
        /// Why it was rejected
        reason: String,
    },

    /// A field type cannot be decoded the way its tag asks for
    #[error("cannot decode into field `{field}` ({type_name}): {reason}")]
    UnsupportedType {
        /// Rust field name
        field: String,
        /// Rust type of the field
        type_name: &'static str,
        /// Why the combination is unsupported
        reason: String,
    },

    /// No byte decoder is registered for a content type
    #[error("no decoder registered for content type `{content_type}`")]
    MissingDecoder {
        /// The requested content type
        content_type: String,
    },

    /// A request body arrived with a content type no decoder handles
    #[error("unsupported content type `{content_type}` for the request body")]
    UnsupportedContentType {
        /// The request's content type
        content_type: String,
    },

    /// More than one field is bound to the request body
    #[error("only one field can be decoded from the body: `{first}` and `{second}` are both tagged `model`")]
    DuplicateModel {
        /// The first `model` field
        first: &'static str,
        /// The second `model` field
        second: &'static str,
    },

    /// Two fields read the same parameter
    #[error("{kind} parameter `{name}` is bound to both `{first}` and `{second}`")]
    DuplicateName {
        /// Where the parameter is read from
        kind: Base,
        /// Parameter name
        name: String,
        /// First field bound to it
        first: &'static str,
        /// Second field bound to it
        second: &'static str,
    },

    /// The binder for a model failed to compile earlier
    #[error("binder for `{model}` failed to compile: {reason}")]
    BinderUnavailable {
        /// Model type name
        model: &'static str,
        /// The original compile error, rendered
        reason: String,
    },

    /// Path parameters are bound but nobody can look them up
    #[error("path parameters are bound but no path variable provider is configured")]
    MissingPathVars,

    /// A raw parameter value could not be converted into its field
    #[error("{kind} parameter `{name}` into field `{field}`: {source}")]
    Decode {
        /// Where the value came from
        kind: Base,
        /// Parameter name
        name: String,
        /// Rust field name
        field: String,
        /// The underlying conversion failure
        #[source]
        source: BoxError,
    },

    /// The request body could not be decoded into the model field
    #[error("could not decode {content_type} body into field `{field}`: {source}")]
    Body {
        /// Content type used to pick the decoder
        content_type: String,
        /// Rust field name
        field: &'static str,
        /// The decoder failure
        #[source]
        source: BoxError,
    },

    /// Strict mode saw a query parameter nothing binds
    #[error("query parameter `{name}` not supported")]
    UnknownParameter {
        /// The unexpected parameter
        name: String,
    },

    /// Request payload too large
    #[error("Payload too large: limit={limit} bytes, received={actual} bytes")]
    PayloadTooLarge {
        /// Max allowed size
        limit: usize,
        /// Actual size
        actual: usize,
    },

    /// The request body could not be read
    #[error("could not read request body: {0}")]
    ReadBody(#[source] BoxError),
}

impl Error {
    /// Whether the client caused this error
    ///
    /// Request-time failures are client errors; wiring failures are not.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::Body { .. }
                | Self::UnknownParameter { .. }
                | Self::UnsupportedContentType { .. }
                | Self::PayloadTooLarge { .. }
                | Self::ReadBody(_)
        )
    }

    /// HTTP status code this error maps to
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            e if e.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn tag(tag: &str, reason: impl Into<String>) -> Self {
        Self::TagParse {
            tag: tag.to_string(),
            reason: reason.into(),
        }
    }
}

/// A request the binder refused to turn into a model
///
/// Wraps the first error met while resolving a model and annotates it with
/// the HTTP status the surrounding pipeline should answer with.
#[derive(Error, Debug)]
#[error("{model} model: {source}")]
pub struct Rejection {
    model: &'static str,
    status: StatusCode,
    #[source]
    source: Error,
}

impl Rejection {
    /// Annotate `source` with `400 Bad Request`
    #[must_use]
    pub const fn bad_request(model: &'static str, source: Error) -> Self {
        Self {
            model,
            status: StatusCode::BAD_REQUEST,
            source,
        }
    }

    /// Status code to respond with
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Name of the model type that failed to resolve
    #[must_use]
    pub const fn model(&self) -> &'static str {
        self.model
    }

    /// The underlying error
    #[must_use]
    pub const fn error(&self) -> &Error {
        &self.source
    }

    /// Consume the rejection and return the underlying error
    #[must_use]
    pub fn into_error(self) -> Error {
        self.source
    }
}
