//! # Tag Descriptors
//!
//! Parses the declarative tag attached to a model field into a
//! [`TagDescriptor`].
//!
//! ## Grammar
//!
//! ```text
//! <base>[,<key>[=<value>]]*
//! ```
//!
//! The positional `base` says where the value comes from (`model`, `path`,
//! `query`, `header`, `cookie`, or `-` to skip). A bare key is a boolean set
//! to `true`, so `query,form,name=b` is the same as
//! `query,form=true,name=b`.

use crate::error::{Error, Result};
use std::fmt;

/// Delimiter used when no `delimiter=` option is given
pub const DEFAULT_DELIMITER: &str = ",";

/// Where a field's value is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Base {
    /// Whole request body, decoded by content type
    Model,
    /// Path variable
    Path,
    /// Query parameter (or form field)
    Query,
    /// Request header
    Header,
    /// Cookie
    Cookie,
    /// Field is ignored
    Skip,
}

impl Base {
    /// Parse the positional part of a tag
    #[must_use]
    pub fn from_tag(s: &str) -> Option<Self> {
        match s {
            "model" => Some(Self::Model),
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            "-" => Some(Self::Skip),
            _ => None,
        }
    }

    /// Name used in tags and error messages
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Skip => "-",
        }
    }

    /// Whether values arrive as named parameters (not body, not skipped)
    #[must_use]
    pub const fn is_parameter(self) -> bool {
        matches!(self, Self::Path | Self::Query | Self::Header | Self::Cookie)
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of one field tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDescriptor {
    /// Source of the value
    pub base: Base,
    /// Parameter name; empty means "use the field name"
    pub name: String,
    /// Whether repeated values map to repeated elements
    pub explode: bool,
    /// Separator for non-exploded compound values
    pub delimiter: String,
    /// Accepted for OpenAPI compatibility; has no effect on decoding
    pub allow_reserved: bool,
    /// Also read from url-encoded request bodies
    pub form: bool,
    /// Only read from url-encoded request bodies
    pub form_only: bool,
    /// Decode the raw value with the decoder for this content type
    pub content: Option<String>,
    /// Assemble the value from `name[key]=value` query parameters
    pub deep_object: bool,
}

impl TagDescriptor {
    fn with_base(base: Base) -> Self {
        Self {
            base,
            name: String::new(),
            explode: false,
            delimiter: DEFAULT_DELIMITER.to_string(),
            allow_reserved: false,
            form: false,
            form_only: false,
            content: None,
            deep_object: false,
        }
    }

    /// Parse a top-level field tag
    ///
    /// `explode` defaults to `true` for `query` and `header` and to `false`
    /// everywhere else unless given explicitly.
    ///
    /// # Errors
    ///
    /// Returns `Error::TagParse` for malformed grammar, unknown or repeated
    /// keys, bad boolean values, empty names or delimiters, and option
    /// combinations that make no sense for the base.
    pub fn parse(tag: &str) -> Result<Self> {
        let mut parts = tag.split(',');
        let positional = parts.next().unwrap_or_default().trim();
        if positional.is_empty() {
            return Err(Error::tag(tag, "missing base"));
        }
        let base = Base::from_tag(positional)
            .ok_or_else(|| Error::tag(tag, format!("unknown base `{positional}`")))?;

        let mut desc = Self::with_base(base);
        let seen = desc.apply_options(tag, parts)?;
        if !base.is_parameter() && !seen.is_empty() {
            return Err(Error::tag(tag, format!("`{base}` takes no options")));
        }
        if !seen.contains(&"explode") {
            desc.explode = matches!(base, Base::Query | Base::Header);
        }
        desc.validate(tag)?;
        Ok(desc)
    }

    /// Parse the tag of a member of a struct-valued parameter
    ///
    /// The positional part is the member key: `-` skips the member and an
    /// empty key means "use the field name". The base is inherited from the
    /// enclosing parameter and `explode` defaults to `false`.
    ///
    /// Returns `Ok(None)` for skipped members.
    ///
    /// # Errors
    ///
    /// Same conditions as [`TagDescriptor::parse`].
    pub fn parse_member(tag: &str, base: Base) -> Result<Option<Self>> {
        let mut parts = tag.split(',');
        let key = parts.next().unwrap_or_default().trim();
        if key == "-" {
            return Ok(None);
        }
        let mut desc = Self::with_base(base);
        desc.apply_options(tag, parts)?;
        if !key.is_empty() {
            desc.name = key.to_string();
        }
        desc.validate(tag)?;
        Ok(Some(desc))
    }

    /// Parameter name, falling back to `field` when the tag gives none
    #[must_use]
    pub fn name_or<'a>(&'a self, field: &'a str) -> &'a str {
        if self.name.is_empty() {
            field
        } else {
            &self.name
        }
    }

    fn apply_options<'t>(
        &mut self,
        tag: &str,
        parts: impl Iterator<Item = &'t str>,
    ) -> Result<Vec<&'t str>> {
        let mut seen = Vec::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                return Err(Error::tag(tag, "empty option"));
            }
            let (key, value) = match part.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (part, None),
            };
            if seen.contains(&key) {
                return Err(Error::tag(tag, format!("option `{key}` is repeated")));
            }
            seen.push(key);

            match key {
                "name" => self.name = required(tag, key, value)?.to_string(),
                "explode" => self.explode = flag(tag, key, value)?,
                "delimiter" => {
                    let delimiter = required(tag, key, value)?;
                    self.delimiter = match delimiter {
                        "comma" => ",",
                        "pipe" => "|",
                        "space" => " ",
                        literal => literal,
                    }
                    .to_string();
                }
                "allowReserved" => self.allow_reserved = flag(tag, key, value)?,
                "form" => self.form = flag(tag, key, value)?,
                "formOnly" => self.form_only = flag(tag, key, value)?,
                "content" => self.content = Some(required(tag, key, value)?.to_string()),
                "deepObject" => self.deep_object = flag(tag, key, value)?,
                _ => return Err(Error::tag(tag, format!("unknown option `{key}`"))),
            }
        }
        if self.form_only {
            self.form = true;
        }
        Ok(seen)
    }

    fn validate(&self, tag: &str) -> Result<()> {
        if self.base != Base::Query {
            let query_only = [
                (self.form, "form"),
                (self.form_only, "formOnly"),
                (self.allow_reserved, "allowReserved"),
                (self.deep_object, "deepObject"),
            ];
            if let Some((_, option)) = query_only.iter().find(|(set, _)| *set) {
                return Err(Error::tag(
                    tag,
                    format!("`{option}` is only valid for query parameters"),
                ));
            }
        }
        if self.content.is_some() && self.deep_object {
            return Err(Error::tag(
                tag,
                "`content` and `deepObject` cannot be combined",
            ));
        }
        Ok(())
    }
}

fn required<'t>(tag: &str, key: &str, value: Option<&'t str>) -> Result<&'t str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::tag(tag, format!("`{key}` needs a value"))),
    }
}

fn flag(tag: &str, key: &str, value: Option<&str>) -> Result<bool> {
    match value {
        None | Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(Error::tag(
            tag,
            format!("`{key}` expects true or false, got `{other}`"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults() {
        let desc = TagDescriptor::parse("query").unwrap();
        assert_eq!(desc.base, Base::Query);
        assert!(desc.name.is_empty());
        assert!(desc.explode);
        assert_eq!(desc.delimiter, ",");
        assert!(!desc.form);
        assert!(desc.content.is_none());
    }

    #[test]
    fn test_explode_defaults_by_base() {
        assert!(TagDescriptor::parse("header").unwrap().explode);
        assert!(!TagDescriptor::parse("path").unwrap().explode);
        assert!(!TagDescriptor::parse("cookie").unwrap().explode);
        assert!(!TagDescriptor::parse("query,explode=false").unwrap().explode);
        assert!(TagDescriptor::parse("path,explode=true").unwrap().explode);
    }

    #[test]
    fn test_bare_boolean_keys() {
        let desc = TagDescriptor::parse("query,form,name=b").unwrap();
        assert!(desc.form);
        assert!(!desc.form_only);
        assert_eq!(desc.name, "b");
    }

    #[test]
    fn test_form_only_implies_form() {
        let desc = TagDescriptor::parse("query,formOnly").unwrap();
        assert!(desc.form_only);
        assert!(desc.form);
    }

    #[test]
    fn test_delimiter_aliases() {
        let pipe = TagDescriptor::parse("query,delimiter=pipe").unwrap();
        assert_eq!(pipe.delimiter, "|");
        let space = TagDescriptor::parse("query,delimiter=space").unwrap();
        assert_eq!(space.delimiter, " ");
        let comma = TagDescriptor::parse("query,delimiter=comma").unwrap();
        assert_eq!(comma.delimiter, ",");
        let literal = TagDescriptor::parse("query,delimiter=;").unwrap();
        assert_eq!(literal.delimiter, ";");
    }

    #[test]
    fn test_content_and_deep_object() {
        let desc = TagDescriptor::parse("query,content=application/json").unwrap();
        assert_eq!(desc.content.as_deref(), Some("application/json"));
        let deep = TagDescriptor::parse("query,deepObject=true").unwrap();
        assert!(deep.deep_object);
        assert!(TagDescriptor::parse("query,deepObject,content=application/json").is_err());
    }

    #[test]
    fn test_model_and_skip() {
        assert_eq!(TagDescriptor::parse("model").unwrap().base, Base::Model);
        assert_eq!(TagDescriptor::parse("-").unwrap().base, Base::Skip);
        assert!(TagDescriptor::parse("model,name=x").is_err());
    }

    #[test]
    fn test_rejects_malformed_tags() {
        for tag in [
            "",
            "body",
            "query,bogus=1",
            "query,explode=maybe",
            "query,name=",
            "query,delimiter=",
            "query,name=a,name=b",
            "query,,form",
            "header,form",
            "path,deepObject",
            "cookie,formOnly",
            "header,allowReserved",
        ] {
            let err = TagDescriptor::parse(tag).unwrap_err();
            assert!(
                matches!(err, Error::TagParse { .. }),
                "{tag:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_member_tags() {
        let member = TagDescriptor::parse_member("", Base::Query).unwrap().unwrap();
        assert_eq!(member.base, Base::Query);
        assert!(member.name.is_empty());
        assert!(!member.explode);
        assert_eq!(member.name_or("Field"), "Field");

        let keyed = TagDescriptor::parse_member("x,explode", Base::Header)
            .unwrap()
            .unwrap();
        assert_eq!(keyed.base, Base::Header);
        assert_eq!(keyed.name_or("Field"), "x");
        assert!(keyed.explode);

        assert!(TagDescriptor::parse_member("-", Base::Query).unwrap().is_none());
    }
}
