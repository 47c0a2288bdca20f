//! # Bindery Core
//!
//! Declarative binding of HTTP request parts into typed models.
//!
//! A model is a plain struct whose fields carry tags saying where each value
//! comes from: the body, a path variable, the query string, a header, or a
//! cookie. Binders are compiled once per model type and then fill a fresh
//! model for every request.
//!
//! ```
//! use bindery_core::{BinderConfig, Model, ModelBinder, Request};
//! use std::collections::HashMap;
//!
//! #[derive(Debug, Default, Model)]
//! struct Listing {
//!     #[bindery("path")]
//!     shop: String,
//!     #[bindery("query,explode=false")]
//!     ids: Vec<u32>,
//!     #[bindery("query,deepObject")]
//!     filter: HashMap<String, String>,
//! }
//!
//! let config = BinderConfig::new().with_route_params();
//! let binder = ModelBinder::<Listing>::compile(&config).unwrap().unwrap();
//! let request = Request::new(http::Method::GET, "/shops/acme?ids=1,7&filter[color]=red")
//!     .with_path_params([("shop", "acme")].into_iter().collect());
//!
//! let listing = binder.resolve(&request).unwrap();
//! assert_eq!(listing.shop, "acme");
//! assert_eq!(listing.ids, vec![1, 7]);
//! assert_eq!(listing.filter["color"], "red");
//! ```
//!
//! ## Modules
//!
//! - `tag` - Field tag grammar
//! - `unpack` - Type-directed unpackers for containers
//! - `scalar` - Primitive and `FromStr` conversion
//! - `model` - Model descriptors and nested struct decoding
//! - `binder` - Per-model compilation
//! - `resolve` - Per-request resolution
//! - `provider` - Binder registry keyed by type
//! - `decoder` - Content-type byte decoders
//! - `request` - Owned request view and query parsing
//! - `path` - Path variables
//! - `config` - Binder configuration
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod binder;
pub mod config;
pub mod decoder;
pub mod error;
pub mod model;
pub mod path;
pub mod provider;
pub mod request;
pub mod resolve;
pub mod scalar;
pub mod tag;
pub mod unpack;

pub use binder::ModelBinder;
pub use bindery_macros::Model;
pub use config::{BinderConfig, Settings};
pub use decoder::{Decoder, DecoderRegistry};
pub use error::{BoxError, Error, Rejection, Result};
pub use model::{Field, Model};
pub use path::{PathVars, PathVarsProvider};
pub use provider::{Binders, Resolved};
pub use request::{QueryValues, Request};
pub use scalar::Text;
pub use tag::{Base, TagDescriptor};
pub use unpack::{Context, Shape, Unpack, Unpacker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
