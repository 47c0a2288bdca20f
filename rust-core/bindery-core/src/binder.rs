//! # Model Binder
//!
//! Compiles a [`Model`] into the fillers that populate it from a request.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Compilation only sorts fields into buckets; resolution lives in
//!   [`resolve`](crate::resolve)
//! - **O**: New field types plug in through [`Unpack`](crate::Unpack)
//! - **D**: Fillers hold type-erased [`Unpacker`]s, never concrete field types
//!
//! Compilation happens once per model type, before traffic. The result is
//! immutable and can be shared across threads without locking.

use crate::config::BinderConfig;
use crate::error::{BoxError, Error, Result};
use crate::model::{BodyFn, Model};
use crate::tag::{Base, TagDescriptor};
use crate::unpack::{Context, DeepValues, Unpacker};
use biscotti::{Processor, ProcessorConfig};
use http::header::HeaderName;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// One parameter-backed field, ready to be filled
pub(crate) struct Filler<M> {
    pub(crate) field: &'static str,
    pub(crate) name: String,
    pub(crate) kind: Base,
    pub(crate) unpacker: Unpacker<M>,
}

impl<M> Clone for Filler<M> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            name: self.name.clone(),
            kind: self.kind,
            unpacker: self.unpacker.clone(),
        }
    }
}

impl<M: 'static> Filler<M> {
    fn error(&self, source: BoxError) -> Error {
        Error::Decode {
            kind: self.kind,
            name: self.name.clone(),
            field: self.field.to_string(),
            source,
        }
    }

    /// Fill from every raw value of the parameter
    pub(crate) fn fill(&self, model: &mut M, values: &[String]) -> Result<()> {
        self.unpacker
            .fill_values(model, values)
            .map_err(|e| self.error(e))
    }

    /// Fill from exactly one raw value
    pub(crate) fn fill_one(&self, model: &mut M, raw: &str) -> Result<()> {
        let filled = match &self.unpacker {
            Unpacker::Single(f) => f(model, raw),
            other => other.fill_values(model, &[raw.to_string()]),
        };
        filled.map_err(|e| self.error(e))
    }

    /// Fill from a grouped `name[key]=value` deep object
    pub(crate) fn fill_deep(&self, model: &mut M, values: &DeepValues) -> Result<()> {
        let filled = match &self.unpacker {
            Unpacker::DeepObject(f) => f(model, values),
            _ => Err("parameter is not a deep object".into()),
        };
        filled.map_err(|e| self.error(e))
    }

    pub(crate) fn source(&self, source: impl Into<BoxError>) -> Error {
        self.error(source.into())
    }
}

/// The field decoded from the request body
pub(crate) struct BodyFiller<M> {
    pub(crate) field: &'static str,
    pub(crate) fill: BodyFn<M>,
}

/// Query (or form) fillers, by parameter name
pub(crate) struct ParamFillers<M> {
    pub(crate) values: HashMap<String, Filler<M>>,
    pub(crate) deep: HashMap<String, Filler<M>>,
}

impl<M> Default for ParamFillers<M> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            deep: HashMap::new(),
        }
    }
}

impl<M> ParamFillers<M> {
    fn insert(&mut self, filler: Filler<M>) -> Result<()> {
        if let Some(existing) = self
            .values
            .get(&filler.name)
            .or_else(|| self.deep.get(&filler.name))
        {
            return Err(Error::DuplicateName {
                kind: filler.kind,
                name: filler.name,
                first: existing.field,
                second: filler.field,
            });
        }
        let bucket = if matches!(filler.unpacker, Unpacker::DeepObject(_)) {
            &mut self.deep
        } else {
            &mut self.values
        };
        bucket.insert(filler.name.clone(), filler);
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len() + self.deep.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_unique<M>(bucket: &mut Vec<Filler<M>>, filler: Filler<M>) -> Result<()> {
    let clash = bucket.iter().find(|f| {
        if filler.kind == Base::Header {
            f.name.eq_ignore_ascii_case(&filler.name)
        } else {
            f.name == filler.name
        }
    });
    if let Some(existing) = clash {
        return Err(Error::DuplicateName {
            kind: filler.kind,
            name: filler.name,
            first: existing.field,
            second: filler.field,
        });
    }
    bucket.push(filler);
    Ok(())
}

/// Compiled request binder for model type `M`
///
/// ```
/// use bindery_core::{BinderConfig, Model, ModelBinder, Request};
///
/// #[derive(Debug, Default, Model)]
/// struct Paging {
///     #[bindery("query")]
///     page: u32,
///     #[bindery("header,name=X-Per-Page")]
///     per_page: Option<u32>,
/// }
///
/// let binder = ModelBinder::<Paging>::compile(&BinderConfig::new())
///     .unwrap()
///     .unwrap();
/// let request = Request::new(http::Method::GET, "/items?page=3").with_header("x-per-page", "50");
/// let paging = binder.resolve(&request).unwrap();
/// assert_eq!(paging.page, 3);
/// assert_eq!(paging.per_page, Some(50));
/// ```
pub struct ModelBinder<M> {
    pub(crate) model: &'static str,
    pub(crate) body: Option<BodyFiller<M>>,
    pub(crate) path: Vec<Filler<M>>,
    pub(crate) header: Vec<Filler<M>>,
    pub(crate) cookie: Vec<Filler<M>>,
    pub(crate) query: ParamFillers<M>,
    pub(crate) form: ParamFillers<M>,
    pub(crate) config: BinderConfig,
    pub(crate) cookies: Processor,
}

impl<M> fmt::Debug for ModelBinder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBinder")
            .field("model", &self.model)
            .field("body", &self.body.as_ref().map(|b| b.field))
            .field("path", &self.path.len())
            .field("header", &self.header.len())
            .field("cookie", &self.cookie.len())
            .field("query", &self.query.len())
            .field("form", &self.form.len())
            .finish_non_exhaustive()
    }
}

impl<M: Model> ModelBinder<M> {
    /// Compile the binder for `M`
    ///
    /// Fields without a tag under the configured tag key, and fields tagged
    /// `-`, are ignored. Returns `Ok(None)` when no field is bound to the
    /// request at all, so callers can skip the model.
    ///
    /// # Errors
    ///
    /// - `Error::TagParse` for malformed tags or invalid header names
    /// - `Error::UnsupportedType` when a field type cannot honor its tag
    /// - `Error::DuplicateModel` for a second `model` field
    /// - `Error::DuplicateName` when two fields read the same parameter
    /// - `Error::MissingPathVars` for `path` fields without a provider
    /// - `Error::MissingDecoder` for a `model` field without usable decoders
    pub fn compile(config: &BinderConfig) -> Result<Option<Self>> {
        let model = std::any::type_name::<M>();
        let mut binder = Self {
            model,
            body: None,
            path: Vec::new(),
            header: Vec::new(),
            cookie: Vec::new(),
            query: ParamFillers::default(),
            form: ParamFillers::default(),
            config: config.clone(),
            cookies: Processor::from(ProcessorConfig::default()),
        };

        for field in M::fields() {
            let Some(raw) = field.tag(config.tag()) else {
                continue;
            };
            let tags = TagDescriptor::parse(raw)?;
            match tags.base {
                Base::Skip => {}
                Base::Model => {
                    if let Some(first) = &binder.body {
                        return Err(Error::DuplicateModel {
                            first: first.field,
                            second: field.name(),
                        });
                    }
                    binder.body = Some(BodyFiller {
                        field: field.name(),
                        fill: field.body_fill()?,
                    });
                }
                Base::Path | Base::Cookie => {
                    let filler = Self::filler(config, &field, tags)?;
                    if !matches!(filler.unpacker, Unpacker::Single(_)) {
                        return Err(Error::UnsupportedType {
                            field: field.name().to_string(),
                            type_name: field.type_name(),
                            reason: format!("{} parameters decode from a single value", filler.kind),
                        });
                    }
                    let bucket = if filler.kind == Base::Path {
                        &mut binder.path
                    } else {
                        &mut binder.cookie
                    };
                    push_unique(bucket, filler)?;
                }
                Base::Header => {
                    let name = tags.name_or(field.name());
                    if let Err(e) = HeaderName::from_bytes(name.as_bytes()) {
                        return Err(Error::tag(raw, format!("invalid header name `{name}`: {e}")));
                    }
                    let filler = Self::filler(config, &field, tags)?;
                    push_unique(&mut binder.header, filler)?;
                }
                Base::Query => {
                    let (form, form_only) = (tags.form, tags.form_only);
                    let filler = Self::filler(config, &field, tags)?;
                    if form {
                        binder.form.insert(filler.clone())?;
                    }
                    if !form_only {
                        binder.query.insert(filler)?;
                    }
                }
            }
        }

        if binder.is_empty() {
            debug!(model, "no request-bound fields, binder declined");
            return Ok(None);
        }
        if !binder.path.is_empty() && config.path_vars().is_none() {
            return Err(Error::MissingPathVars);
        }
        if binder.body.is_some() {
            let decoders = config.decoders();
            match config.default_content_type() {
                Some(content_type) if !decoders.contains(content_type) => {
                    return Err(Error::MissingDecoder {
                        content_type: content_type.to_string(),
                    });
                }
                _ if decoders.is_empty() => {
                    return Err(Error::MissingDecoder {
                        content_type: config.default_content_type().unwrap_or("*/*").to_string(),
                    });
                }
                _ => {}
            }
        }

        debug!(
            model,
            body = binder.body.is_some(),
            path = binder.path.len(),
            header = binder.header.len(),
            cookie = binder.cookie.len(),
            query = binder.query.len(),
            form = binder.form.len(),
            "compiled model binder"
        );
        Ok(Some(binder))
    }

    fn filler(
        config: &BinderConfig,
        field: &crate::model::Field<M>,
        tags: TagDescriptor,
    ) -> Result<Filler<M>> {
        let name = tags.name_or(field.name()).to_string();
        let kind = tags.base;
        let cx = Context::new(config, field.name(), &name, tags);
        let unpacker = field.unpacker(&cx)?;
        tracing::trace!(
            field = field.name(),
            name = %name,
            kind = %kind,
            unpacker = unpacker.kind(),
            "bound field"
        );
        Ok(Filler {
            field: field.name(),
            name,
            kind,
            unpacker,
        })
    }

    fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.path.is_empty()
            && self.header.is_empty()
            && self.cookie.is_empty()
            && self.query.is_empty()
            && self.form.is_empty()
    }

    /// Whether a field is decoded from the request body
    #[must_use]
    pub fn needs_body(&self) -> bool {
        self.body.is_some() || !self.form.is_empty()
    }

    /// Whether any field reads path variables
    #[must_use]
    pub fn needs_path(&self) -> bool {
        !self.path.is_empty()
    }

    /// Whether any field can be read from a url-encoded form body
    #[must_use]
    pub fn needs_form(&self) -> bool {
        !self.form.is_empty()
    }

    /// Type name of the model, used in rejections
    #[must_use]
    pub const fn model(&self) -> &'static str {
        self.model
    }
}
