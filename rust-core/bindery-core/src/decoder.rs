//! # Content Decoders
//!
//! Byte decoders used for `model` (request body) fields and for parameters
//! tagged `content=<type>`.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only turns raw bytes into typed values
//! - **O**: Custom decoders plug in through [`Decoder::custom`]
//! - **D**: Depends on serde abstractions, not concrete parsers
//!
//! JSON goes through simd-json with a serde_json fallback, the same pairing
//! the rest of the crate uses for parsing speed.

use crate::error::BoxError;
use mime::Mime;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a user-supplied decoder
///
/// Custom decoders produce a `serde_json::Value` which is then deserialized
/// into the destination type.
pub type CustomDecoder =
    Arc<dyn Fn(&[u8]) -> Result<serde_json::Value, BoxError> + Send + Sync>;

/// A byte decoder for one content type
#[derive(Clone)]
pub enum Decoder {
    /// `application/json`
    Json,
    /// `application/xml`, `text/xml`
    Xml,
    /// `application/yaml`, `text/yaml`, `application/x-yaml`
    Yaml,
    /// `application/x-www-form-urlencoded`
    UrlEncoded,
    /// User-supplied decoder
    Custom(CustomDecoder),
}

impl Decoder {
    /// Wrap a closure as a decoder
    pub fn custom<F>(decode: F) -> Self
    where
        F: Fn(&[u8]) -> Result<serde_json::Value, BoxError> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(decode))
    }

    /// Built-in decoder for a content type, if there is one
    #[must_use]
    pub fn builtin(content_type: &str) -> Option<Self> {
        match content_type {
            "application/json" => Some(Self::Json),
            "application/xml" | "text/xml" => Some(Self::Xml),
            "application/yaml" | "text/yaml" | "application/x-yaml" => Some(Self::Yaml),
            "application/x-www-form-urlencoded" => Some(Self::UrlEncoded),
            _ => None,
        }
    }

    /// Decode `bytes` into a `T`
    ///
    /// # Errors
    ///
    /// Returns the underlying parser error, boxed.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BoxError> {
        match self {
            Self::Json => parse_json(bytes),
            Self::Xml => {
                let text = std::str::from_utf8(bytes)?;
                Ok(quick_xml::de::from_str(text)?)
            }
            Self::Yaml => Ok(serde_yaml::from_slice(bytes)?),
            Self::UrlEncoded => Ok(serde_html_form::from_bytes(bytes)?),
            Self::Custom(decode) => {
                let value = decode(bytes)?;
                Ok(serde_json::from_value(value)?)
            }
        }
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("Json"),
            Self::Xml => f.write_str("Xml"),
            Self::Yaml => f.write_str("Yaml"),
            Self::UrlEncoded => f.write_str("UrlEncoded"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Parse JSON bytes using simd-json
///
/// simd-json parses in place, so the input is copied into a scratch buffer.
/// Falls back to serde_json if simd-json rejects the input; when both fail
/// the serde_json error is reported since its messages carry line/column.
fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BoxError> {
    let mut scratch = bytes.to_vec();
    match simd_json::from_slice(&mut scratch) {
        Ok(value) => Ok(value),
        Err(_) => Ok(serde_json::from_slice(bytes)?),
    }
}

/// Content type -> decoder mapping consulted for bodies and `content=` tags
#[derive(Debug, Clone, Default)]
pub struct DecoderRegistry {
    decoders: HashMap<String, Decoder>,
}

impl DecoderRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the decoder for a content type
    pub fn insert(&mut self, content_type: impl Into<String>, decoder: Decoder) {
        self.decoders.insert(content_type.into(), decoder);
    }

    /// Decoder registered under exactly this content type
    #[must_use]
    pub fn get(&self, content_type: &str) -> Option<&Decoder> {
        self.decoders.get(content_type)
    }

    /// Decoder for a request `Content-Type` header value
    ///
    /// Tries an exact match first, then the MIME essence so
    /// `application/json; charset=utf-8` finds `application/json`.
    #[must_use]
    pub fn find(&self, content_type: &str) -> Option<&Decoder> {
        self.get(content_type).or_else(|| {
            let mime: Mime = content_type.parse().ok()?;
            self.decoders.get(mime.essence_str())
        })
    }

    /// Whether a content type has a registered decoder
    #[must_use]
    pub fn contains(&self, content_type: &str) -> bool {
        self.find(content_type).is_some()
    }

    /// Number of registered decoders
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Whether no decoder is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: i32,
    }

    #[test]
    fn test_json_object() {
        let person: Person = Decoder::Json
            .decode(br#"{"name": "John", "age": 30}"#)
            .unwrap();
        assert_eq!(
            person,
            Person {
                name: "John".to_string(),
                age: 30
            }
        );
    }

    #[test]
    fn test_invalid_json() {
        let result: Result<Person, _> = Decoder::Json.decode(b"not valid json");
        assert!(result.is_err());
    }

    #[test]
    fn test_xml() {
        let person: Person = Decoder::Xml
            .decode(b"<Person><name>Ann</name><age>41</age></Person>")
            .unwrap();
        assert_eq!(person.name, "Ann");
        assert_eq!(person.age, 41);
    }

    #[test]
    fn test_yaml() {
        let person: Person = Decoder::Yaml.decode(b"name: Bob\nage: 7\n").unwrap();
        assert_eq!(person.age, 7);
    }

    #[test]
    fn test_url_encoded() {
        let person: Person = Decoder::UrlEncoded.decode(b"name=Eve&age=22").unwrap();
        assert_eq!(person.name, "Eve");
    }

    #[test]
    fn test_custom_decoder() {
        let decoder = Decoder::custom(|bytes| {
            let text = std::str::from_utf8(bytes)?;
            let (name, age) = text.split_once(':').ok_or("missing colon")?;
            Ok(serde_json::json!({ "name": name, "age": age.parse::<i32>()? }))
        });
        let person: Person = decoder.decode(b"Zed:3").unwrap();
        assert_eq!(person.name, "Zed");
        assert!(decoder.decode::<Person>(b"Zed").is_err());
    }

    #[test]
    fn test_builtin_lookup() {
        assert!(matches!(Decoder::builtin("application/json"), Some(Decoder::Json)));
        assert!(matches!(Decoder::builtin("text/xml"), Some(Decoder::Xml)));
        assert!(matches!(Decoder::builtin("application/x-yaml"), Some(Decoder::Yaml)));
        assert!(Decoder::builtin("application/msgpack").is_none());
    }

    #[test]
    fn test_registry_matches_mime_essence() {
        let mut registry = DecoderRegistry::new();
        assert!(registry.is_empty());
        registry.insert("application/json", Decoder::Json);

        assert!(registry.get("application/json; charset=utf-8").is_none());
        assert!(registry.find("application/json; charset=utf-8").is_some());
        assert!(registry.contains("application/json"));
        assert!(!registry.contains("application/xml"));
        assert_eq!(registry.len(), 1);

        let map: BTreeMap<String, i32> = registry
            .find("application/json")
            .unwrap()
            .decode(br#"{"a": 1}"#)
            .unwrap();
        assert_eq!(map["a"], 1);
    }
}
