//! # Scalar Conversion
//!
//! String-to-value conversion for primitive parameter types.
//!
//! ## Design Principles
//!
//! - **S**: Single responsibility - each impl converts one type
//! - **O**: Open for extension via [`Text`] and [`unpack_text!`](crate::unpack_text)
//! - **D**: Containers depend on [`Unpack`], not on concrete scalars
//!
//! All integer widths, `f32`/`f64`, `char` and `String` use their `FromStr`
//! impls. `bool` is more lenient than `FromStr` and accepts
//! `true/false/1/0/t/f/yes/no` in any case.

use crate::error::{BoxError, Result};
use crate::unpack::{Context, Shape, Unpack, Unpacker};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// A raw value that could not be converted
#[derive(Debug, Error)]
#[error("cannot convert {value:?} to {type_name}: {reason}")]
pub struct ScalarError {
    value: String,
    type_name: &'static str,
    reason: String,
}

impl ScalarError {
    fn new<T>(value: &str, reason: impl fmt::Display) -> Self {
        Self {
            value: value.to_string(),
            type_name: std::any::type_name::<T>(),
            reason: reason.to_string(),
        }
    }
}

/// Parse a boolean the way query strings spell them
///
/// # Errors
///
/// Returns `ScalarError` for anything outside `true/false/1/0/t/f/yes/no`.
pub fn parse_bool(raw: &str) -> std::result::Result<bool, ScalarError> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => Ok(true),
        "false" | "0" | "f" | "no" => Ok(false),
        _ => Err(ScalarError::new::<bool>(raw, "expected true or false")),
    }
}

/// Single-value unpacker around a parse function
///
/// # Errors
///
/// Scalars decode one value; `deepObject=true` is rejected.
pub fn scalar_unpacker<T, P, E>(cx: &Context<'_>, parse: P) -> Result<Unpacker<T>>
where
    T: 'static,
    P: Fn(&str) -> std::result::Result<T, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    if cx.tags().deep_object {
        return Err(cx.unsupported::<T>("deepObject=true is only supported for maps and structs"));
    }
    Ok(Unpacker::single(move |slot: &mut T, raw: &str| {
        *slot = parse(raw).map_err(Into::<BoxError>::into)?;
        Ok(())
    }))
}

macro_rules! unpack_from_str {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Unpack for $ty {
                const SHAPE: Shape = Shape::Primitive;

                fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
                    scalar_unpacker(cx, |raw: &str| {
                        raw.parse::<$ty>().map_err(|e| ScalarError::new::<$ty>(raw, e))
                    })
                }
            }
        )+
    };
}

unpack_from_str!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, char, String,
);

impl Unpack for bool {
    const SHAPE: Shape = Shape::Primitive;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        scalar_unpacker(cx, parse_bool)
    }
}

/// Unpacker for any `FromStr` type
///
/// # Errors
///
/// Same as [`scalar_unpacker`].
pub fn text_unpacker<T>(cx: &Context<'_>) -> Result<Unpacker<T>>
where
    T: FromStr + 'static,
    T::Err: Into<BoxError>,
{
    scalar_unpacker(cx, T::from_str)
}

/// Implement [`Unpack`] for `FromStr + Default` types
///
/// ```ignore
/// #[derive(Default)]
/// struct Celsius(f32);
/// impl std::str::FromStr for Celsius { /* ... */ }
///
/// bindery_core::unpack_text!(Celsius);
/// ```
#[macro_export]
macro_rules! unpack_text {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Unpack for $ty {
                const SHAPE: $crate::Shape = $crate::Shape::Text;

                fn unpacker(
                    cx: &$crate::Context<'_>,
                ) -> $crate::Result<$crate::Unpacker<Self>> {
                    $crate::scalar::text_unpacker::<Self>(cx)
                }
            }
        )+
    };
}

unpack_text!(PathBuf);

/// Field wrapper decoding `T` through its `FromStr` impl
///
/// Use it for foreign types that cannot implement [`Unpack`] directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Text<T>(pub T);

impl<T> Text<T> {
    /// Unwrap the decoded value
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Text<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Text<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> FromStr for Text<T>
where
    T: FromStr,
{
    type Err = T::Err;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        T::from_str(s).map(Self)
    }
}

impl<T> Unpack for Text<T>
where
    T: FromStr + Default + 'static,
    T::Err: Into<BoxError>,
{
    const SHAPE: Shape = Shape::Text;

    fn unpacker(cx: &Context<'_>) -> Result<Unpacker<Self>> {
        text_unpacker::<Self>(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinderConfig;
    use crate::error::Error;
    use crate::tag::TagDescriptor;
    use crate::unpack::SingleFn;
    use std::sync::Arc;

    fn fill<T: Unpack>(raw: &str) -> std::result::Result<T, BoxError> {
        let config = BinderConfig::new();
        let cx = Context::new(&config, "field", "param", TagDescriptor::parse("query").unwrap());
        let single: Arc<SingleFn<T>> = T::unpacker(&cx).unwrap().into_single().unwrap();
        let mut slot = T::default();
        single(&mut slot, raw)?;
        Ok(slot)
    }

    #[test]
    fn test_convert_int() {
        assert_eq!(fill::<i64>("123").unwrap(), 123);
        assert_eq!(fill::<i8>("-45").unwrap(), -45);
        assert_eq!(fill::<u128>("340282366920938463463374607431768211455").unwrap(), u128::MAX);
    }

    #[test]
    fn test_convert_int_invalid() {
        let err = fill::<u8>("256").unwrap_err();
        assert!(err.to_string().contains("cannot convert \"256\" to u8"));
        assert!(fill::<i32>("abc").is_err());
        assert!(fill::<i32>("").is_err());
    }

    #[test]
    fn test_convert_float() {
        assert!((fill::<f64>("3.25").unwrap() - 3.25).abs() < f64::EPSILON);
        assert!((fill::<f32>("-0.5").unwrap() + 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_convert_bool() {
        for raw in ["true", "TRUE", "1", "t", "yes"] {
            assert!(fill::<bool>(raw).unwrap(), "{raw}");
        }
        for raw in ["false", "0", "F", "no"] {
            assert!(!fill::<bool>(raw).unwrap(), "{raw}");
        }
        assert!(fill::<bool>("maybe").is_err());
    }

    #[test]
    fn test_convert_char_and_string() {
        assert_eq!(fill::<char>("x").unwrap(), 'x');
        assert!(fill::<char>("xy").is_err());
        assert_eq!(fill::<String>("hello world").unwrap(), "hello world");
    }

    #[test]
    fn test_text_wrapper() {
        let addr = fill::<Text<u16>>("8080").unwrap();
        assert_eq!(*addr, 8080);
        assert_eq!(addr.into_inner(), 8080);
        assert_eq!(fill::<PathBuf>("/tmp/x").unwrap(), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_deep_object_rejected() {
        let config = BinderConfig::new();
        let cx = Context::new(
            &config,
            "field",
            "param",
            TagDescriptor::parse("query,deepObject").unwrap(),
        );
        assert!(matches!(
            i32::unpacker(&cx),
            Err(Error::UnsupportedType { .. })
        ));
    }
}
