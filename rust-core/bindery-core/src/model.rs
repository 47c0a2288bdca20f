//! # Model Descriptors
//!
//! A [`Model`] is a struct whose fields can be filled from a request. Its
//! [`Field`] table lists, per field, the Rust name, the raw tags and the
//! bindings the field supports:
//!
//! - `unpack` - decoded from parameters through [`Unpack`]
//! - `content` - decoded from a parameter by a content-type decoder
//! - `body` - decoded from the whole request body
//!
//! `#[derive(Model)]` writes the table; it can also be written by hand:
//!
//! ```
//! use bindery_core::{Field, Model};
//!
//! #[derive(Default)]
//! struct Search {
//!     term: String,
//!     page: Option<u32>,
//! }
//!
//! impl Model for Search {
//!     fn fields() -> Vec<Field<Self>> {
//!         vec![
//!             Field::new("term", &[("bindery", "query,name=q")]).unpack(|s: &mut Self| &mut s.term),
//!             Field::new("page", &[("bindery", "query")]).unpack(|s: &mut Self| &mut s.page),
//!         ]
//!     }
//! }
//! ```

use crate::decoder::Decoder;
use crate::error::{BoxError, Error, Result};
use crate::tag::{Base, TagDescriptor};
use crate::unpack::{self, resplit_on_equals, Context, DeepValues, Fill, Shape, SingleFn, Unpack, Unpacker};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A struct that can be filled from request parts
pub trait Model: Default + 'static {
    /// Descriptor table, one entry per field
    fn fields() -> Vec<Field<Self>>;
}

type Builder<M> = Box<dyn Fn(&Context<'_>) -> Result<Unpacker<M>> + Send + Sync>;

/// Fills a model field from the request body
pub type BodyFn<M> = Arc<dyn Fn(&mut M, &Decoder, &[u8]) -> Fill + Send + Sync>;

fn builder<M, F>(f: F) -> Builder<M>
where
    F: Fn(&Context<'_>) -> Result<Unpacker<M>> + Send + Sync + 'static,
{
    Box::new(f)
}

fn body_fn<M, F>(f: F) -> BodyFn<M>
where
    F: Fn(&mut M, &Decoder, &[u8]) -> Fill + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Descriptor of one model field
pub struct Field<M> {
    name: &'static str,
    tags: &'static [(&'static str, &'static str)],
    type_name: &'static str,
    shape: Option<Shape>,
    unpack: Option<Builder<M>>,
    content: Option<Builder<M>>,
    body: Option<BodyFn<M>>,
}

impl<M> fmt::Debug for Field<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("type_name", &self.type_name)
            .field("shape", &self.shape)
            .field("unpack", &self.unpack.is_some())
            .field("content", &self.content.is_some())
            .field("body", &self.body.is_some())
            .finish()
    }
}

impl<M: 'static> Field<M> {
    /// Describe field `name` with its `(tag key, tag value)` pairs
    ///
    /// The field has no bindings until one of the binding methods is called.
    #[must_use]
    pub const fn new(name: &'static str, tags: &'static [(&'static str, &'static str)]) -> Self {
        Self {
            name,
            tags,
            type_name: "?",
            shape: None,
            unpack: None,
            content: None,
            body: None,
        }
    }

    /// Decode the field from parameters
    #[must_use]
    pub fn unpack<F: Unpack>(mut self, access: fn(&mut M) -> &mut F) -> Self {
        self.type_name = std::any::type_name::<F>();
        self.shape = Some(F::SHAPE);
        self.unpack = Some(builder(move |cx| Ok(unpack::build::<F>(cx)?.focus(access))));
        self
    }

    /// Decode the field from a parameter tagged `content=<type>`
    #[must_use]
    pub fn content<F: DeserializeOwned + 'static>(mut self, access: fn(&mut M) -> &mut F) -> Self {
        self.type_name = std::any::type_name::<F>();
        self.content = Some(builder(move |cx| Ok(unpack::content::<F>(cx)?.focus(access))));
        self
    }

    /// Like [`Field::content`], decoding exploded values element by element
    #[must_use]
    pub fn content_sequence<E: DeserializeOwned + 'static>(
        mut self,
        access: fn(&mut M) -> &mut Vec<E>,
    ) -> Self {
        self.type_name = std::any::type_name::<Vec<E>>();
        self.content = Some(builder(move |cx| {
            Ok(unpack::content_sequence::<E>(cx)?.focus(access))
        }));
        self
    }

    /// Like [`Field::content`], decoding exploded `key=value` entries one by one
    #[must_use]
    pub fn content_map<F, K, V>(mut self, access: fn(&mut M) -> &mut F) -> Self
    where
        F: DeserializeOwned + Default + Extend<(K, V)> + 'static,
        K: Unpack,
        V: DeserializeOwned + 'static,
    {
        self.type_name = std::any::type_name::<F>();
        self.content = Some(builder(move |cx| {
            Ok(unpack::content_map::<F, K, V>(cx)?.focus(access))
        }));
        self
    }

    /// Decode the field from the request body
    #[must_use]
    pub fn body<F: DeserializeOwned + 'static>(mut self, access: fn(&mut M) -> &mut F) -> Self {
        self.type_name = std::any::type_name::<F>();
        self.body = Some(body_fn(move |model: &mut M, decoder: &Decoder, bytes: &[u8]| {
            *access(model) = decoder.decode(bytes)?;
            Ok(())
        }));
        self
    }

    /// Rust field name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type of the field
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Shape of the field type, when bound through [`Field::unpack`]
    #[must_use]
    pub const fn shape(&self) -> Option<Shape> {
        self.shape
    }

    /// Raw tag stored under `key`
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&'static str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, value)| *value)
    }

    fn unsupported(&self, reason: impl Into<String>) -> Error {
        Error::UnsupportedType {
            field: self.name.to_string(),
            type_name: self.type_name,
            reason: reason.into(),
        }
    }

    /// Parameter unpacker for this field, lifted to the model
    pub(crate) fn unpacker(&self, cx: &Context<'_>) -> Result<Unpacker<M>> {
        let (build, missing) = if cx.tags().content.is_some() {
            (&self.content, "field has no content binding")
        } else {
            (&self.unpack, "field cannot be decoded from parameters")
        };
        match build {
            Some(build) => build(cx),
            None => Err(self.unsupported(missing)),
        }
    }

    /// Body decoder for this field
    pub(crate) fn body_fill(&self) -> Result<BodyFn<M>> {
        self.body
            .clone()
            .ok_or_else(|| self.unsupported("field cannot be decoded from the body"))
    }
}

#[derive(Debug, Error)]
enum MemberError {
    #[error("no struct member to receive key `{0}`")]
    Unknown(String),
    #[error("{field}: {source}")]
    Field {
        field: &'static str,
        #[source]
        source: BoxError,
    },
}

fn member_error(field: &'static str) -> impl FnOnce(BoxError) -> BoxError {
    move |source: BoxError| -> BoxError { Box::new(MemberError::Field { field, source }) }
}

struct Member<S> {
    field: &'static str,
    unpacker: Unpacker<S>,
}

/// Unpacker for a struct-valued parameter
///
/// Members are found through the same tag key as top-level fields; their
/// positional part is the member key (`-` skips, empty uses the field
/// name). Depending on the enclosing tag the struct decodes from:
///
/// - a deep object (`deepObject=true`, query only)
/// - exploded `key=value` values (query and header)
/// - one value split into alternating keys and values
///
/// Unknown keys are ignored unless the configuration rejects unknown query
/// parameters.
///
/// # Errors
///
/// Fails on malformed member tags, duplicate member keys, `deepObject` on a
/// member, and members that cannot decode a single value.
pub fn struct_unpacker<S: Model>(cx: &Context<'_>) -> Result<Unpacker<S>> {
    unpack::check_simple_style::<S>(cx)?;
    let outer = cx.tags();
    let mut members: HashMap<String, Member<S>> = HashMap::new();

    for field in S::fields() {
        let raw = field.tag(cx.config().tag()).unwrap_or_default();
        let Some(mut tags) = TagDescriptor::parse_member(raw, cx.base())? else {
            continue;
        };
        let key = tags.name_or(field.name()).to_string();
        if let Some(existing) = members.get(&key) {
            return Err(Error::DuplicateName {
                kind: cx.base(),
                name: key,
                first: existing.field,
                second: field.name(),
            });
        }
        if tags.deep_object {
            return Err(field.unsupported("deepObject=true is not allowed inside a struct"));
        }
        if !outer.deep_object {
            tags.explode = false;
        }
        let member_cx = cx.member(field.name(), &key, tags);
        let unpacker = field.unpacker(&member_cx)?;
        members.insert(
            key,
            Member {
                field: field.name(),
                unpacker,
            },
        );
    }

    let strict = cx.config().rejects_unknown_query_parameters();

    if outer.deep_object {
        if cx.base() != Base::Query {
            return Err(cx.unsupported::<S>(format!(
                "deepObject=true is not supported for {} parameters",
                cx.base()
            )));
        }
        return Ok(Unpacker::deep_object(move |slot: &mut S, values: &DeepValues| {
            for (key, raw) in values {
                let Some(member) = members.get(key) else {
                    if strict {
                        return Err(MemberError::Unknown(key.clone()).into());
                    }
                    continue;
                };
                let filled = match &member.unpacker {
                    Unpacker::Single(f) => match raw.first() {
                        Some(first) => f(slot, first.as_str()),
                        None => Ok(()),
                    },
                    other => other.fill_values(slot, raw),
                };
                filled.map_err(member_error(member.field))?;
            }
            Ok(())
        }));
    }

    let mut singles: HashMap<String, (&'static str, Arc<SingleFn<S>>)> = HashMap::new();
    for (key, member) in members {
        let single = member.unpacker.into_single().ok_or_else(|| {
            cx.unsupported::<S>(format!(
                "member `{}` must decode from a single value",
                member.field
            ))
        })?;
        singles.insert(key, (member.field, single));
    }

    if cx.explodes() {
        return Ok(Unpacker::multi(move |slot: &mut S, values: &[String]| {
            fill_pairs(slot, &singles, strict, &resplit_on_equals(values))
        }));
    }
    let delimiter = outer.delimiter.clone();
    Ok(Unpacker::single(move |slot: &mut S, raw: &str| {
        let tokens: Vec<&str> = raw.split(delimiter.as_str()).collect();
        fill_pairs(slot, &singles, strict, &tokens)
    }))
}

fn fill_pairs<S>(
    slot: &mut S,
    members: &HashMap<String, (&'static str, Arc<SingleFn<S>>)>,
    strict: bool,
    tokens: &[&str],
) -> Fill {
    for pair in tokens.chunks(2) {
        let key = pair[0];
        let value = pair.get(1).copied().unwrap_or_default();
        match members.get(key) {
            Some((field, fill)) => fill(slot, value).map_err(member_error(*field))?,
            None if strict => return Err(MemberError::Unknown(key.to_string()).into()),
            None => {}
        }
    }
    Ok(())
}
