//! # Request Resolution
//!
//! Runs a compiled [`ModelBinder`] against one request.
//!
//! Fillers run in a fixed order: body, path, headers, query, form body,
//! deep objects, cookies. Every filler runs even after a failure; the first
//! failure is the one reported.

use crate::binder::{Filler, ModelBinder, ParamFillers};
use crate::error::{Error, Rejection, Result};
use crate::model::Model;
use crate::request::{QueryValues, Request};
use crate::unpack::DeepValues;
use biscotti::RequestCookies;
use http::header::COOKIE;
use std::collections::HashMap;
use tracing::debug;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Keeps the first error recorded
#[derive(Debug, Default)]
struct FirstError(Option<Error>);

impl FirstError {
    fn record(&mut self, outcome: Result<()>) {
        if let Err(e) = outcome {
            self.0.get_or_insert(e);
        }
    }
}

/// Deep-object values buffered per root parameter, with the filler they belong to
///
/// Query and form bodies each get their own buffer: the same root may name
/// one field in the query string and another in the form body.
type DeepBuffer<'b, M> = HashMap<&'b str, (&'b Filler<M>, DeepValues)>;

/// Split `root[key]` into its root and key
///
/// Both parts must be non-empty and the key may not contain brackets.
fn split_deep_key(param: &str) -> Option<(&str, &str)> {
    let inner = param.strip_suffix(']')?;
    let (root, key) = inner.split_once('[')?;
    if root.is_empty() || key.is_empty() || key.contains(['[', ']']) || root.contains(']') {
        return None;
    }
    Some((root, key))
}

impl<M: Model> ModelBinder<M> {
    /// Build a model from `request`
    ///
    /// # Errors
    ///
    /// Returns a `400 Bad Request` [`Rejection`] carrying the first failure.
    pub fn resolve(&self, request: &Request) -> std::result::Result<M, Rejection> {
        let mut model = M::default();
        let mut errors = FirstError::default();

        self.fill_body(&mut model, request, &mut errors);
        self.fill_path(&mut model, request, &mut errors);
        self.fill_headers(&mut model, request, &mut errors);

        let strict = self.config.rejects_unknown_query_parameters();
        let mut query_deep: DeepBuffer<'_, M> = HashMap::new();
        self.fill_params(
            &self.query,
            &request.query(),
            strict,
            &mut model,
            &mut query_deep,
            &mut errors,
        );
        let mut form_deep: DeepBuffer<'_, M> = HashMap::new();
        if !self.form.is_empty() && request.content_type() == Some(FORM_URLENCODED) {
            let form = QueryValues::parse(request.body());
            self.fill_params(&self.form, &form, strict, &mut model, &mut form_deep, &mut errors);
        }
        for (filler, values) in query_deep.values().chain(form_deep.values()) {
            errors.record(filler.fill_deep(&mut model, values));
        }

        self.fill_cookies(&mut model, request, &mut errors);

        match errors.0 {
            None => Ok(model),
            Some(error) => {
                debug!(model = self.model, error = %error, "rejected request");
                Err(Rejection::bad_request(self.model, error))
            }
        }
    }

    /// Like [`ModelBinder::resolve`], returning the model boxed
    ///
    /// # Errors
    ///
    /// Same as [`ModelBinder::resolve`].
    pub fn resolve_boxed(&self, request: &Request) -> std::result::Result<Box<M>, Rejection> {
        self.resolve(request).map(Box::new)
    }

    fn fill_body(&self, model: &mut M, request: &Request, errors: &mut FirstError) {
        let Some(body) = &self.body else {
            return;
        };
        let content_type = request
            .content_type()
            .or_else(|| self.config.default_content_type())
            .unwrap_or_default();
        let Some(decoder) = self.config.decoders().find(content_type) else {
            errors.record(Err(Error::UnsupportedContentType {
                content_type: content_type.to_string(),
            }));
            return;
        };
        errors.record((body.fill)(model, decoder, &request.body()[..]).map_err(|source| {
            Error::Body {
                content_type: content_type.to_string(),
                field: body.field,
                source,
            }
        }));
    }

    fn fill_path(&self, model: &mut M, request: &Request, errors: &mut FirstError) {
        if self.path.is_empty() {
            return;
        }
        let vars = self
            .config
            .path_vars()
            .map(|provider| provider(request))
            .unwrap_or_default();
        for filler in &self.path {
            errors.record(filler.fill_one(model, vars.get(&filler.name).unwrap_or_default()));
        }
    }

    fn fill_headers(&self, model: &mut M, request: &Request, errors: &mut FirstError) {
        for filler in &self.header {
            let values: std::result::Result<Vec<String>, _> = request
                .headers()
                .get_all(filler.name.as_str())
                .iter()
                .map(|v| v.to_str().map(String::from))
                .collect();
            match values {
                Ok(values) if values.is_empty() => {}
                Ok(values) => errors.record(filler.fill(model, &values)),
                Err(e) => errors.record(Err(filler.source(e))),
            }
        }
    }

    fn fill_params<'b>(
        &self,
        fillers: &'b ParamFillers<M>,
        params: &QueryValues,
        strict: bool,
        model: &mut M,
        deep: &mut DeepBuffer<'b, M>,
        errors: &mut FirstError,
    ) {
        for (key, values) in params.iter() {
            if let Some(filler) = fillers.values.get(key) {
                errors.record(filler.fill(model, values));
                continue;
            }
            let target = split_deep_key(key)
                .and_then(|(root, sub)| fillers.deep.get_key_value(root).map(|entry| (entry, sub)));
            if let Some(((root, filler), sub)) = target {
                deep.entry(root.as_str())
                    .or_insert_with(|| (filler, DeepValues::new()))
                    .1
                    .insert(sub.to_string(), values.to_vec());
                continue;
            }
            if strict {
                errors.record(Err(Error::UnknownParameter {
                    name: key.to_string(),
                }));
            }
        }
    }

    fn fill_cookies(&self, model: &mut M, request: &Request, errors: &mut FirstError) {
        let Some(first) = self.cookie.first() else {
            return;
        };
        let mut jar = RequestCookies::new();
        for header in request.headers().get_all(COOKIE) {
            let parsed = match header.to_str() {
                Ok(header) => jar
                    .extend_from_header(header, &self.cookies)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(reason) = parsed {
                errors.record(Err(Error::Decode {
                    kind: first.kind,
                    name: COOKIE.to_string(),
                    field: first.field.to_string(),
                    source: reason.into(),
                }));
            }
        }
        for filler in &self.cookie {
            if let Some(cookie) = jar.get(&filler.name) {
                errors.record(filler.fill_one(model, cookie.value()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinderConfig;
    use crate::decoder::Decoder;
    use crate::model::Field;
    use crate::path::PathVars;
    use crate::tag::Base;
    use http::Method;
    use std::collections::BTreeMap;

    #[test]
    fn test_split_deep_key() {
        assert_eq!(split_deep_key("m[x]"), Some(("m", "x")));
        assert_eq!(split_deep_key("filter[a b]"), Some(("filter", "a b")));
        assert_eq!(split_deep_key("m"), None);
        assert_eq!(split_deep_key("[x]"), None);
        assert_eq!(split_deep_key("m[]"), None);
        assert_eq!(split_deep_key("m[x][y]"), None);
        assert_eq!(split_deep_key("m[x"), None);
    }

    #[test]
    fn test_first_error_wins() {
        let mut errors = FirstError::default();
        errors.record(Ok(()));
        errors.record(Err(Error::UnknownParameter { name: "a".into() }));
        errors.record(Err(Error::UnknownParameter { name: "b".into() }));
        assert!(matches!(errors.0, Some(Error::UnknownParameter { name }) if name == "a"));
    }

    #[derive(Debug, Default)]
    struct Everything {
        body: BTreeMap<String, i32>,
        id: u32,
        trace: Vec<String>,
        page: i32,
        filter: BTreeMap<String, i32>,
        note: String,
        session: String,
    }

    impl Model for Everything {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::new("body", &[("bindery", "model")]).body(|e: &mut Self| &mut e.body),
                Field::new("id", &[("bindery", "path")]).unpack(|e: &mut Self| &mut e.id),
                Field::new("trace", &[("bindery", "header,name=X-Trace")])
                    .unpack(|e: &mut Self| &mut e.trace),
                Field::new("page", &[("bindery", "query")]).unpack(|e: &mut Self| &mut e.page),
                Field::new("filter", &[("bindery", "query,deepObject")])
                    .unpack(|e: &mut Self| &mut e.filter),
                Field::new("note", &[("bindery", "query,form")]).unpack(|e: &mut Self| &mut e.note),
                Field::new("session", &[("bindery", "cookie,name=sid")])
                    .unpack(|e: &mut Self| &mut e.session),
            ]
        }
    }

    fn binder(config: BinderConfig) -> ModelBinder<Everything> {
        let config = config
            .with_decoder("application/json", Decoder::Json)
            .with_path_vars(|_| PathVars::from_iter([("id", "42")]));
        ModelBinder::compile(&config).unwrap().unwrap()
    }

    #[test]
    fn test_resolve_every_source() {
        let request = Request::new(Method::POST, "/things/42?page=2&filter[a]=1&filter[b]=2&note=q")
            .with_header("content-type", "application/json")
            .with_header("x-trace", "one")
            .with_header("X-Trace", "two")
            .with_header("cookie", "sid=abc; other=1")
            .with_body(r#"{"k": 9}"#);
        let model = binder(BinderConfig::new()).resolve(&request).unwrap();
        assert_eq!(model.body["k"], 9);
        assert_eq!(model.id, 42);
        assert_eq!(model.trace, vec!["one", "two"]);
        assert_eq!(model.page, 2);
        assert_eq!(model.filter, BTreeMap::from([("a".into(), 1), ("b".into(), 2)]));
        assert_eq!(model.note, "q");
        assert_eq!(model.session, "abc");
    }

    #[test]
    fn test_unknown_content_type_rejected() {
        let request = Request::new(Method::POST, "/things/42?page=x")
            .with_header("content-type", "application/msgpack")
            .with_body("??");
        let rejection = binder(BinderConfig::new()).resolve(&request).unwrap_err();
        assert_eq!(rejection.status(), http::StatusCode::BAD_REQUEST);
        assert!(matches!(rejection.error(), Error::UnsupportedContentType { .. }));
    }

    #[derive(Debug, Default)]
    struct Search {
        q: String,
        token: String,
        filter: BTreeMap<String, String>,
    }

    impl Model for Search {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::new("q", &[("bindery", "query,form")]).unpack(|s: &mut Self| &mut s.q),
                Field::new("token", &[("bindery", "query,formOnly")]).unpack(|s: &mut Self| &mut s.token),
                Field::new("filter", &[("bindery", "query,formOnly,deepObject")])
                    .unpack(|s: &mut Self| &mut s.filter),
            ]
        }
    }

    fn form_post(content_type: &str, body: &'static str) -> Request {
        Request::new(Method::POST, "/search?token=leaked&filter[x]=leaked")
            .with_header("content-type", content_type)
            .with_body(body)
    }

    #[test]
    fn test_form_only_reads_body() {
        let binder = ModelBinder::<Search>::compile(&BinderConfig::new()).unwrap().unwrap();
        assert!(binder.needs_form());
        let search = binder
            .resolve(&form_post(FORM_URLENCODED, "q=rust+lang&token=t1&filter[kind]=crate"))
            .unwrap();
        assert_eq!(search.q, "rust lang");
        assert_eq!(search.token, "t1");
        assert_eq!(search.filter, BTreeMap::from([("kind".into(), "crate".into())]));
    }

    #[test]
    fn test_form_needs_exact_content_type() {
        let binder = ModelBinder::<Search>::compile(&BinderConfig::new()).unwrap().unwrap();
        let search = binder
            .resolve(&form_post(
                "application/x-www-form-urlencoded; charset=utf-8",
                "token=t1",
            ))
            .unwrap();
        assert!(search.token.is_empty());
        assert!(search.filter.is_empty());
    }

    #[derive(Debug, Default)]
    struct SplitSources {
        from_query: BTreeMap<String, String>,
        from_form: BTreeMap<String, String>,
    }

    impl Model for SplitSources {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::new("from_query", &[("bindery", "query,name=q,deepObject")])
                    .unpack(|s: &mut Self| &mut s.from_query),
                Field::new("from_form", &[("bindery", "query,name=q,formOnly,deepObject")])
                    .unpack(|s: &mut Self| &mut s.from_form),
            ]
        }
    }

    #[test]
    fn test_same_deep_root_in_query_and_form() {
        let binder = ModelBinder::<SplitSources>::compile(&BinderConfig::new())
            .unwrap()
            .unwrap();
        let request = Request::new(Method::POST, "/search?q[a]=fromquery")
            .with_header("content-type", FORM_URLENCODED)
            .with_body("q[b]=fromform");
        let split = binder.resolve(&request).unwrap();
        assert_eq!(
            split.from_query,
            BTreeMap::from([("a".into(), "fromquery".into())])
        );
        assert_eq!(
            split.from_form,
            BTreeMap::from([("b".into(), "fromform".into())])
        );
    }

    #[test]
    fn test_strict_mode_collects_unknown() {
        let request = Request::new(Method::POST, "/things/42?page=1&zzz=2&filter[a]=1")
            .with_header("content-type", "application/json")
            .with_body("{}");
        let lenient = binder(BinderConfig::new()).resolve(&request).unwrap();
        assert_eq!(lenient.page, 1);

        let strict = binder(BinderConfig::new().reject_unknown_query_parameters(true));
        let rejection = strict.resolve(&request).unwrap_err();
        assert!(matches!(
            rejection.error(),
            Error::UnknownParameter { name } if name == "zzz"
        ));
    }

    #[test]
    fn test_malformed_cookie_header() {
        let request = Request::new(Method::POST, "/things/42")
            .with_header("content-type", "application/json")
            .with_header("cookie", "no-equals-sign")
            .with_body("{}");
        let rejection = binder(BinderConfig::new()).resolve(&request).unwrap_err();
        assert!(matches!(
            rejection.error(),
            Error::Decode {
                kind: Base::Cookie,
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_boxed() {
        let request = Request::new(Method::POST, "/things/42")
            .with_header("content-type", "application/json")
            .with_body("{}");
        let boxed = binder(BinderConfig::new()).resolve_boxed(&request).unwrap();
        assert_eq!(boxed.id, 42);
    }
}
