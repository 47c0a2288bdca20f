//! # Binder Registry
//!
//! Type-keyed store of compiled binders.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only compiles, stores and hands out binders
//! - **O**: Any [`Model`] can be provided without registering it up front
//! - **D**: Handlers depend on [`Binders`], not on how binders are built
//!
//! A host's injection layer asks the registry to [`provide`](Binders::provide)
//! each model type a handler needs while wiring routes. A model with no
//! request-bound fields is declined, and the host can satisfy it some other
//! way.

use crate::binder::ModelBinder;
use crate::config::BinderConfig;
use crate::error::{Error, Rejection, Result};
use crate::model::Model;
use crate::request::Request;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

type Entry = Arc<dyn Any + Send + Sync>;

/// What providing a model type produced
enum Slot {
    Ready(Entry),
    Declined,
    Failed(Arc<str>),
}

/// Compiled binders keyed by model type
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone, Default)]
pub struct Binders {
    config: Arc<BinderConfig>,
    data: Arc<RwLock<HashMap<TypeId, Slot>>>,
}

impl std::fmt::Debug for Binders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binders")
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}

impl Binders {
    /// Create a registry compiling with `config`
    #[must_use]
    pub fn new(config: BinderConfig) -> Self {
        Self {
            config: Arc::new(config),
            data: Arc::default(),
        }
    }

    /// Configuration binders are compiled with
    #[must_use]
    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Compile and store the binder for `M` unless already known
    ///
    /// Returns `false` when `M` has no request-bound fields. Every outcome,
    /// failures included, is remembered, so `M` is compiled at most once.
    ///
    /// # Errors
    ///
    /// Any compile error of [`ModelBinder::compile`] on the first call, and
    /// `Error::BinderUnavailable` on later calls for the same type.
    pub fn provide<M>(&self) -> Result<bool>
    where
        M: Model,
    {
        let key = TypeId::of::<M>();
        if let Some(known) = self.read().get(&key) {
            return match known {
                Slot::Ready(_) => Ok(true),
                Slot::Declined => Ok(false),
                Slot::Failed(reason) => Err(Error::BinderUnavailable {
                    model: std::any::type_name::<M>(),
                    reason: reason.to_string(),
                }),
            };
        }
        let (slot, outcome) = match ModelBinder::<M>::compile(&self.config) {
            Ok(Some(binder)) => (Slot::Ready(Arc::new(binder)), Ok(true)),
            Ok(None) => (Slot::Declined, Ok(false)),
            Err(e) => {
                warn!(model = std::any::type_name::<M>(), error = %e, "binder failed to compile");
                (Slot::Failed(e.to_string().into()), Err(e))
            }
        };
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(slot);
        outcome
    }

    /// Binder for `M`, if provided and not declined
    #[must_use]
    pub fn get<M>(&self) -> Option<Arc<ModelBinder<M>>>
    where
        M: Model,
    {
        let entry = match self.read().get(&TypeId::of::<M>()) {
            Some(Slot::Ready(entry)) => Arc::clone(entry),
            _ => return None,
        };
        entry.downcast::<ModelBinder<M>>().ok()
    }

    /// Whether `M` was provided (declined models count, failed ones do not)
    #[must_use]
    pub fn contains<M: 'static>(&self) -> bool {
        matches!(
            self.read().get(&TypeId::of::<M>()),
            Some(Slot::Ready(_) | Slot::Declined)
        )
    }

    /// Number of models provided so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.read()
            .values()
            .filter(|slot| !matches!(slot, Slot::Failed(_)))
            .count()
    }

    /// Whether nothing was provided yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `M` from `request`, providing its binder on first use
    ///
    /// Request failures are reported inside [`Resolved::Rejected`].
    ///
    /// # Errors
    ///
    /// Compile errors of `M` (see [`Binders::provide`]), which are wiring
    /// errors (see [`Error::status_code`]).
    pub fn resolve<M>(&self, request: &Request) -> Result<Resolved<M>>
    where
        M: Model,
    {
        if !self.provide::<M>()? {
            return Ok(Resolved::Declined);
        }
        let Some(binder) = self.get::<M>() else {
            return Ok(Resolved::Declined);
        };
        Ok(match binder.resolve(request) {
            Ok(model) => Resolved::Bound(model),
            Err(rejection) => Resolved::Rejected(rejection),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TypeId, Slot>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Outcome of [`Binders::resolve`]
#[derive(Debug)]
pub enum Resolved<M> {
    /// The model was built from the request
    Bound(M),
    /// The request could not be bound
    Rejected(Rejection),
    /// `M` has no request-bound fields
    Declined,
}

impl<M> Resolved<M> {
    /// The bound model, treating a decline as a wiring error
    ///
    /// # Errors
    ///
    /// The rejection's error for rejected requests, `Error::UnsupportedType`
    /// for declined models.
    pub fn into_result(self) -> Result<M> {
        match self {
            Self::Bound(model) => Ok(model),
            Self::Rejected(rejection) => Err(rejection.into_error()),
            Self::Declined => Err(Error::UnsupportedType {
                field: String::new(),
                type_name: std::any::type_name::<M>(),
                reason: "model has no request-bound fields".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
    use http::Method;

    #[derive(Debug, Default)]
    struct Page {
        number: u32,
    }

    impl Model for Page {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::new("number", &[("bindery", "query,name=page")]).unpack(|p: &mut Self| &mut p.number)]
        }
    }

    #[derive(Debug, Default)]
    struct Plain {
        value: i32,
    }

    impl Model for Plain {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::new("value", &[]).unpack(|p: &mut Self| &mut p.value)]
        }
    }

    #[derive(Debug, Default)]
    struct Broken {
        value: i32,
    }

    impl Model for Broken {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::new("value", &[("bindery", "query,bogus")]).unpack(|p: &mut Self| &mut p.value)]
        }
    }

    #[test]
    fn test_provide_and_get() {
        let binders = Binders::new(BinderConfig::new());
        assert!(binders.is_empty());
        assert!(binders.provide::<Page>().unwrap());
        assert!(binders.provide::<Page>().unwrap());
        assert_eq!(binders.len(), 1);

        let binder = binders.get::<Page>().unwrap();
        let page = binder
            .resolve(&Request::new(Method::GET, "/?page=4"))
            .unwrap();
        assert_eq!(page.number, 4);
    }

    #[test]
    fn test_declined_models_are_remembered() {
        let binders = Binders::new(BinderConfig::new());
        assert!(!binders.provide::<Plain>().unwrap());
        assert!(binders.contains::<Plain>());
        assert!(binders.get::<Plain>().is_none());
        assert!(matches!(
            binders.resolve::<Plain>(&Request::new(Method::GET, "/")),
            Ok(Resolved::Declined)
        ));
    }

    #[derive(Debug, Default)]
    struct Upload {
        data: serde_json::Value,
    }

    impl Model for Upload {
        fn fields() -> Vec<Field<Self>> {
            vec![Field::new("data", &[("bindery", "model")]).body(|u: &mut Self| &mut u.data)]
        }
    }

    #[test]
    fn test_compile_errors_are_remembered() {
        let binders = Binders::new(BinderConfig::new());
        assert!(matches!(
            binders.provide::<Broken>(),
            Err(Error::TagParse { .. })
        ));
        assert!(!binders.contains::<Broken>());
        assert!(binders.is_empty());

        let again = binders
            .resolve::<Broken>(&Request::new(Method::GET, "/?value=1"))
            .unwrap_err();
        assert!(matches!(again, Error::BinderUnavailable { ref reason, .. } if reason.contains("bogus")));
        assert_eq!(again.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_body_without_decoders_is_server_error() {
        let binders = Binders::new(BinderConfig::new());
        let err = binders.provide::<Upload>().unwrap_err();
        assert!(matches!(err, Error::MissingDecoder { ref content_type } if content_type == "*/*"));
        assert!(!err.is_client_error());
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_resolve_on_demand() {
        let binders = Binders::new(BinderConfig::new());
        let clone = binders.clone();
        let bound = clone
            .resolve::<Page>(&Request::new(Method::GET, "/?page=9"))
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(bound.number, 9);
        assert!(binders.contains::<Page>());

        let rejected = binders
            .resolve::<Page>(&Request::new(Method::GET, "/?page=nine"))
            .unwrap();
        assert!(matches!(rejected, Resolved::Rejected(ref r) if r.status() == http::StatusCode::BAD_REQUEST));
        assert!(matches!(rejected.into_result(), Err(Error::Decode { .. })));
    }
}
