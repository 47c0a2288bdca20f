//! # Path Variables
//!
//! Route parameters made available to `path` fields.
//!
//! Routing itself is left to the host: it hands the binder a
//! [`PathVarsProvider`] that looks the variables up for a request, or stores
//! them on the [`Request`] and uses
//! [`BinderConfig::with_route_params`](crate::BinderConfig::with_route_params).

use crate::request::Request;
use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up the path variables of a request
///
/// Called once per request, and only for models with `path` fields.
pub type PathVarsProvider = Arc<dyn Fn(&Request) -> PathVars + Send + Sync>;

/// Decoded path variables of one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars {
    vars: HashMap<String, String>,
}

impl PathVars {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the parameters of a `matchit` match, percent-decoding values
    ///
    /// Values that do not decode to UTF-8 are decoded lossily.
    #[must_use]
    pub fn from_params(params: &matchit::Params<'_, '_>) -> Self {
        params
            .iter()
            .map(|(key, value)| (key, percent_decode_str(value).decode_utf8_lossy().into_owned()))
            .collect()
    }

    /// Set a variable
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Value of a variable
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Number of variables
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether there are no variables
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for PathVars
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
