//! # Unpackers
//!
//! Type-directed construction of the functions that turn raw request strings
//! into typed values.
//!
//! Every decodable type implements [`Unpack`] and reports how it wants its
//! input through an [`Unpacker`]:
//!
//! - `Single` - one raw string (`?id=7`, a path segment, a cookie)
//! - `Multi` - every occurrence of a parameter (`?id=7&id=8`)
//! - `DeepObject` - `name[key]=value` query parameters grouped by key
//!
//! Unpackers are built once per field at wiring time and are immutable
//! afterwards.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Each impl only knows how to fill its own type
//! - **O**: New types opt in by implementing [`Unpack`]
//! - **L**: Containers delegate to any `Unpack` element type
//! - **D**: Binders depend on [`Unpacker`], never on concrete types

use crate::config::BinderConfig;
use crate::decoder::Decoder;
use crate::error::{BoxError, Error, Result};
use crate::tag::{Base, TagDescriptor, DEFAULT_DELIMITER};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use thiserror::Error;

/// Outcome of filling one slot
pub type Fill = std::result::Result<(), BoxError>;

/// Sub-key -> values of one deep object (`name[key]=value`)
pub type DeepValues = BTreeMap<String, Vec<String>>;

/// Fills a slot from one raw value
pub type SingleFn<T> = dyn Fn(&mut T, &str) -> Fill + Send + Sync;

/// Fills a slot from every raw value of a parameter
pub type MultiFn<T> = dyn Fn(&mut T, &[String]) -> Fill + Send + Sync;

/// Fills a slot from a grouped deep object
pub type DeepFn<T> = dyn Fn(&mut T, &DeepValues) -> Fill + Send + Sync;

/// Kind of type an [`Unpack`] impl decodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Integers, floats, `bool`, `char`, `String`
    Primitive,
    /// `FromStr` types
    Text,
    /// `Option<T>`, `Box<T>`
    Pointer,
    /// `Vec<T>`
    Sequence,
    /// `[T; N]`
    Array,
    /// `HashMap`, `BTreeMap`
    Map,
    /// Nested [`Model`](crate::Model) structs
    Struct,
}

impl Shape {
    /// Whether values of this shape are assembled from several tokens
    #[must_use]
    pub const fn is_compound(self) -> bool {
        matches!(self, Self::Sequence | Self::Array | Self::Map | Self::Struct)
    }
}

/// How a type consumes raw request values
pub enum Unpacker<T> {
    /// Decode from a single raw value
    Single(Arc<SingleFn<T>>),
    /// Decode from all raw values of one parameter
    Multi(Arc<MultiFn<T>>),
    /// Decode from `name[key]=value` query parameters
    DeepObject(Arc<DeepFn<T>>),
}

impl<T> Clone for Unpacker<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Single(f) => Self::Single(Arc::clone(f)),
            Self::Multi(f) => Self::Multi(Arc::clone(f)),
            Self::DeepObject(f) => Self::DeepObject(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for Unpacker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unpacker::{}", self.kind())
    }
}

impl<T> Unpacker<T> {
    /// Name of the capability, for logs and errors
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Single(_) => "Single",
            Self::Multi(_) => "Multi",
            Self::DeepObject(_) => "DeepObject",
        }
    }

    /// The single-value decoder, if that is what this is
    #[must_use]
    pub fn into_single(self) -> Option<Arc<SingleFn<T>>> {
        match self {
            Self::Single(f) => Some(f),
            _ => None,
        }
    }
}

impl<T: 'static> Unpacker<T> {
    /// Build a single-value unpacker
    pub fn single<F>(f: F) -> Self
    where
        F: Fn(&mut T, &str) -> Fill + Send + Sync + 'static,
    {
        Self::Single(Arc::new(f))
    }

    /// Build a multi-value unpacker
    pub fn multi<F>(f: F) -> Self
    where
        F: Fn(&mut T, &[String]) -> Fill + Send + Sync + 'static,
    {
        Self::Multi(Arc::new(f))
    }

    /// Build a deep-object unpacker
    pub fn deep_object<F>(f: F) -> Self
    where
        F: Fn(&mut T, &DeepValues) -> Fill + Send + Sync + 'static,
    {
        Self::DeepObject(Arc::new(f))
    }

    /// Lift an unpacker for `T` into one for a container `M` of `T`
    ///
    /// `access` projects the container onto the slot being filled.
    #[must_use]
    pub fn focus<M: 'static>(self, access: fn(&mut M) -> &mut T) -> Unpacker<M> {
        match self {
            Self::Single(f) => Unpacker::single(move |m: &mut M, raw: &str| f(access(m), raw)),
            Self::Multi(f) => Unpacker::multi(move |m: &mut M, values: &[String]| f(access(m), values)),
            Self::DeepObject(f) => {
                Unpacker::deep_object(move |m: &mut M, values: &DeepValues| f(access(m), values))
            }
        }
    }

    /// Apply to a parameter's raw values: all of them for `Multi`, the first
    /// one for `Single`
    pub(crate) fn fill_values(&self, slot: &mut T, values: &[String]) -> Fill {
        match self {
            Self::Single(f) => match values.first() {
                Some(raw) => f(slot, raw.as_str()),
                None => Ok(()),
            },
            Self::Multi(f) => f(slot, values),
            Self::DeepObject(_) => Err("deep object cannot be filled from plain values".into()),
        }
    }
}

/// Everything an [`Unpack`] impl needs to know about the field it decodes
#[derive(Debug, Clone)]
pub struct Context<'a> {
    config: &'a BinderConfig,
    field: &'a str,
    name: &'a str,
    tags: TagDescriptor,
}

impl<'a> Context<'a> {
    pub(crate) const fn new(
        config: &'a BinderConfig,
        field: &'a str,
        name: &'a str,
        tags: TagDescriptor,
    ) -> Self {
        Self {
            config,
            field,
            name,
            tags,
        }
    }

    pub(crate) fn member<'b>(
        &'b self,
        field: &'b str,
        name: &'b str,
        tags: TagDescriptor,
    ) -> Context<'b> {
        Context::new(self.config, field, name, tags)
    }

    /// Binder configuration
    #[must_use]
    pub const fn config(&self) -> &'a BinderConfig {
        self.config
    }

    /// Where the value is read from
    #[must_use]
    pub const fn base(&self) -> Base {
        self.tags.base
    }

    /// Rust field name
    #[must_use]
    pub const fn field(&self) -> &'a str {
        self.field
    }

    /// Parameter name
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Parsed field tag
    #[must_use]
    pub const fn tags(&self) -> &TagDescriptor {
        &self.tags
    }

    /// Whether repeated parameters become repeated elements
    ///
    /// Only query parameters and headers can explode.
    #[must_use]
    pub const fn explodes(&self) -> bool {
        self.tags.explode && matches!(self.tags.base, Base::Query | Base::Header)
    }

    /// Same field with `explode` turned off
    #[must_use]
    pub fn without_explode(&self) -> Self {
        let mut cx = self.clone();
        cx.tags.explode = false;
        cx
    }

    /// Same field with `deepObject` turned off
    #[must_use]
    pub fn without_deep_object(&self) -> Self {
        let mut cx = self.clone();
        cx.tags.deep_object = false;
        cx
    }

    /// Same field with `content` removed
    #[must_use]
    pub fn without_content(&self) -> Self {
        let mut cx = self.clone();
        cx.tags.content = None;
        cx
    }

    /// `Error::UnsupportedType` for this field and type `T`
    #[must_use]
    pub fn unsupported<T: ?Sized>(&self, reason: impl Into<String>) -> Error {
        Error::UnsupportedType {
            field: self.field.to_string(),
            type_name: std::any::type_name::<T>(),
            reason: reason.into(),
        }
    }
}

/// A type that can be decoded from request parameters
///
/// Implemented for primitives, `String`, `Option`, `Box`, `Vec`, arrays,
/// `HashMap`, `BTreeMap`, [`Text`](crate::Text), and every
/// `#[derive(Model)]` struct. Implement it by hand to teach the binder a new
/// type.
pub trait Unpack: Default + 'static {
    /// What kind of type this is
    const SHAPE: Shape;

    /// Build the unpacker for one field of this type
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedType` when the tag asks for something this
    /// type cannot do.
    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>>;
}

/// Build the unpacker for a field of type `T`
///
/// # Errors
///
/// Fails when the field asks for `content=` decoding (which needs a
/// deserializable binding, see [`Field::content`](crate::Field::content)) or
/// when `T` rejects the tag.
pub fn build<T: Unpack>(cx: &Context<'_>) -> Result<Unpacker<T>> {
    if let Some(content_type) = &cx.tags.content {
        return Err(cx.unsupported::<T>(format!(
            "content={content_type} requires a deserializable field binding"
        )));
    }
    tracing::trace!(
        field = cx.field,
        name = cx.name,
        base = %cx.base(),
        shape = ?T::SHAPE,
        "building unpacker"
    );
    T::unpacker(cx)
}

#[derive(Debug, Error)]
#[error("too many values for fixed length array of {capacity}")]
pub(crate) struct CapacityError {
    capacity: usize,
}

/// Path and cookie compound values only support the plain comma style
pub(crate) fn check_simple_style<T: ?Sized>(cx: &Context<'_>) -> Result<()> {
    if matches!(cx.base(), Base::Path | Base::Cookie) {
        if cx.tags.delimiter != DEFAULT_DELIMITER {
            return Err(cx.unsupported::<T>(format!(
                "custom delimiters are not supported for {} parameters",
                cx.base()
            )));
        }
        if cx.tags.explode {
            return Err(cx.unsupported::<T>(format!(
                "explode=true is not supported for {} parameters",
                cx.base()
            )));
        }
    }
    Ok(())
}

/// Single-value unpacker for an element, key, or member type
pub(crate) fn element<T: Unpack>(cx: &Context<'_>) -> Result<Arc<SingleFn<T>>> {
    T::unpacker(cx)?
        .into_single()
        .ok_or_else(|| cx.unsupported::<T>("elements must decode from a single value"))
}

/// Split each `key=value` into its two halves
pub(crate) fn resplit_on_equals(values: &[String]) -> Vec<&str> {
    values
        .iter()
        .flat_map(|v| {
            let (key, value) = v.split_once('=').unwrap_or((v.as_str(), ""));
            [key, value]
        })
        .collect()
}

fn fresh<T: Default>(slot: &mut Option<T>) -> &mut T {
    slot.insert(T::default())
}

fn fresh_box<T: Default>(slot: &mut Box<T>) -> &mut T {
    *slot = Box::default();
    &mut **slot
}

impl<T: Unpack> Unpack for Option<T> {
    const SHAPE: Shape = Shape::Pointer;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        Ok(T::unpacker(cx)?.focus(fresh::<T>))
    }
}

impl<T: Unpack> Unpack for Box<T> {
    const SHAPE: Shape = Shape::Pointer;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        Ok(T::unpacker(cx)?.focus(fresh_box::<T>))
    }
}

fn sequence_element<S: ?Sized, T: Unpack>(cx: &Context<'_>) -> Result<Arc<SingleFn<T>>> {
    check_simple_style::<S>(cx)?;
    if cx.tags.deep_object {
        return Err(cx.unsupported::<S>("deepObject=true is not supported for sequences"));
    }
    element::<T>(&cx.without_explode())
}

fn collect_elements<'v, T: Default>(
    element: &SingleFn<T>,
    values: impl Iterator<Item = &'v str>,
) -> std::result::Result<Vec<T>, BoxError> {
    let mut out = Vec::with_capacity(values.size_hint().0);
    for raw in values {
        let mut item = T::default();
        element(&mut item, raw)?;
        out.push(item);
    }
    Ok(out)
}

fn fill_array<'v, T: Default, const N: usize>(
    slot: &mut [T; N],
    element: &SingleFn<T>,
    values: impl Iterator<Item = &'v str>,
) -> Fill {
    let mut count = 0;
    for raw in values {
        let target = slot
            .get_mut(count)
            .ok_or(CapacityError { capacity: N })?;
        *target = T::default();
        element(target, raw)?;
        count += 1;
    }
    for target in slot.iter_mut().skip(count) {
        *target = T::default();
    }
    Ok(())
}

impl<T: Unpack> Unpack for Vec<T> {
    const SHAPE: Shape = Shape::Sequence;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        let element = sequence_element::<Self, T>(cx)?;
        if cx.explodes() {
            return Ok(Unpacker::multi(move |slot: &mut Self, values: &[String]| {
                *slot = collect_elements(&*element, values.iter().map(String::as_str))?;
                Ok(())
            }));
        }
        let delimiter = cx.tags.delimiter.clone();
        Ok(Unpacker::single(move |slot: &mut Self, raw: &str| {
            *slot = collect_elements(&*element, raw.split(delimiter.as_str()))?;
            Ok(())
        }))
    }
}

impl<T: Unpack, const N: usize> Unpack for [T; N]
where
    [T; N]: Default,
{
    const SHAPE: Shape = Shape::Array;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        let element = sequence_element::<Self, T>(cx)?;
        if cx.explodes() {
            return Ok(Unpacker::multi(move |slot: &mut Self, values: &[String]| {
                fill_array(slot, &*element, values.iter().map(String::as_str))
            }));
        }
        let delimiter = cx.tags.delimiter.clone();
        Ok(Unpacker::single(move |slot: &mut Self, raw: &str| {
            fill_array(slot, &*element, raw.split(delimiter.as_str()))
        }))
    }
}

fn collect_pairs<M, K, V>(
    key: &SingleFn<K>,
    value: &SingleFn<V>,
    tokens: &[&str],
) -> std::result::Result<M, BoxError>
where
    M: Default + Extend<(K, V)>,
    K: Default,
    V: Default,
{
    let mut out = M::default();
    for pair in tokens.chunks(2) {
        let mut k = K::default();
        key(&mut k, pair[0])?;
        let mut v = V::default();
        value(&mut v, pair.get(1).copied().unwrap_or_default())?;
        out.extend(std::iter::once((k, v)));
    }
    Ok(out)
}

/// Shared body of the `HashMap` and `BTreeMap` impls
fn map_unpacker<M, K, V>(cx: &Context<'_>) -> Result<Unpacker<M>>
where
    M: Default + Extend<(K, V)> + 'static,
    K: Unpack,
    V: Unpack,
{
    check_simple_style::<M>(cx)?;
    let key = element::<K>(&cx.without_explode().without_deep_object())?;
    let value_cx = if cx.tags.deep_object {
        cx.without_deep_object()
    } else {
        cx.without_explode()
    };
    let value = V::unpacker(&value_cx)?;

    if cx.tags.deep_object {
        if cx.base() != Base::Query {
            return Err(cx.unsupported::<M>(format!(
                "deepObject=true is not supported for {} parameters",
                cx.base()
            )));
        }
        if matches!(value, Unpacker::DeepObject(_)) {
            return Err(cx.unsupported::<M>("deep objects cannot nest"));
        }
        return Ok(Unpacker::deep_object(move |slot: &mut M, values: &DeepValues| {
            let mut out = M::default();
            for (raw_key, raw_values) in values {
                let mut k = K::default();
                key(&mut k, raw_key.as_str())?;
                let mut v = V::default();
                match &value {
                    Unpacker::Single(f) => {
                        f(&mut v, raw_values.first().map_or("", String::as_str))?;
                    }
                    other => other.fill_values(&mut v, raw_values)?,
                }
                out.extend(std::iter::once((k, v)));
            }
            *slot = out;
            Ok(())
        }));
    }

    let value = value
        .into_single()
        .ok_or_else(|| cx.unsupported::<M>("map values must decode from a single value"))?;
    if cx.explodes() {
        return Ok(Unpacker::multi(move |slot: &mut M, values: &[String]| {
            *slot = collect_pairs(&*key, &*value, &resplit_on_equals(values))?;
            Ok(())
        }));
    }
    let delimiter = cx.tags.delimiter.clone();
    Ok(Unpacker::single(move |slot: &mut M, raw: &str| {
        let tokens: Vec<&str> = raw.split(delimiter.as_str()).collect();
        *slot = collect_pairs(&*key, &*value, &tokens)?;
        Ok(())
    }))
}

impl<K, V, S> Unpack for HashMap<K, V, S>
where
    K: Unpack + Eq + Hash,
    V: Unpack,
    S: BuildHasher + Default + 'static,
{
    const SHAPE: Shape = Shape::Map;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        map_unpacker::<Self, K, V>(cx)
    }
}

impl<K, V> Unpack for BTreeMap<K, V>
where
    K: Unpack + Ord,
    V: Unpack,
{
    const SHAPE: Shape = Shape::Map;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        map_unpacker::<Self, K, V>(cx)
    }
}

fn content_decoder<T: ?Sized>(cx: &Context<'_>) -> Result<Decoder> {
    check_simple_style::<T>(cx)?;
    let content_type = cx
        .tags
        .content
        .as_deref()
        .ok_or_else(|| cx.unsupported::<T>("no content type given"))?;
    cx.config
        .decoders()
        .get(content_type)
        .cloned()
        .or_else(|| Decoder::builtin(content_type))
        .ok_or_else(|| Error::MissingDecoder {
            content_type: content_type.to_string(),
        })
}

/// Unpacker that runs the field's `content=` decoder over the raw value
///
/// # Errors
///
/// Returns `Error::MissingDecoder` when neither the registry nor the
/// built-ins know the content type.
pub fn content<T: DeserializeOwned + 'static>(cx: &Context<'_>) -> Result<Unpacker<T>> {
    let decoder = content_decoder::<T>(cx)?;
    Ok(Unpacker::single(move |slot: &mut T, raw: &str| {
        *slot = decoder.decode(raw.as_bytes())?;
        Ok(())
    }))
}

/// `content=` unpacker for a `Vec`
///
/// Exploded query and header parameters decode every occurrence into its
/// own element; otherwise the single value decodes into the whole `Vec`.
///
/// # Errors
///
/// Same as [`content`].
pub fn content_sequence<E: DeserializeOwned + 'static>(
    cx: &Context<'_>,
) -> Result<Unpacker<Vec<E>>> {
    if !cx.explodes() {
        return content::<Vec<E>>(cx);
    }
    let decoder = content_decoder::<Vec<E>>(cx)?;
    Ok(Unpacker::multi(move |slot: &mut Vec<E>, values: &[String]| {
        *slot = values
            .iter()
            .map(|raw| decoder.decode::<E>(raw.as_bytes()))
            .collect::<std::result::Result<_, _>>()?;
        Ok(())
    }))
}

/// `content=` unpacker for a map
///
/// Exploded query and header parameters read each occurrence as
/// `key=value`: the key decodes like any other parameter, the value through
/// the content decoder. Otherwise the single value decodes into the whole
/// map.
///
/// # Errors
///
/// Same as [`content`], plus key types that cannot decode a single value.
pub fn content_map<M, K, V>(cx: &Context<'_>) -> Result<Unpacker<M>>
where
    M: DeserializeOwned + Default + Extend<(K, V)> + 'static,
    K: Unpack,
    V: DeserializeOwned + 'static,
{
    if !cx.explodes() {
        return content::<M>(cx);
    }
    let decoder = content_decoder::<M>(cx)?;
    let key = element::<K>(&cx.without_explode().without_content().without_deep_object())?;
    Ok(Unpacker::multi(move |slot: &mut M, values: &[String]| {
        let mut out = M::default();
        for pair in values {
            let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
            let mut k = K::default();
            key(&mut k, raw_key)?;
            let v: V = decoder.decode(raw_value.as_bytes())?;
            out.extend(std::iter::once((k, v)));
        }
        *slot = out;
        Ok(())
    }))
}
