//! Scalar conversion through every parameter source.

use bindery_core::{
    BinderConfig, Error, Field, Model, ModelBinder, PathVars, Rejection, Request, Text, Unpack,
};
use http::Method;
use rstest::rstest;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Default)]
struct One<T> {
    value: T,
}

impl<T: Unpack> Model for One<T> {
    fn fields() -> Vec<Field<Self>> {
        vec![Field::new("value", &[("bindery", "query,name=v")]).unpack(|one: &mut Self| &mut one.value)]
    }
}

fn bind<T: Unpack>(raw: &str) -> Result<T, Rejection> {
    let binder = ModelBinder::<One<T>>::compile(&BinderConfig::new())
        .unwrap()
        .unwrap();
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("v", raw)
        .finish();
    binder
        .resolve(&Request::new(Method::GET, &format!("/x?{query}")))
        .map(|one| one.value)
}

#[rstest]
#[case::int8(bind::<i8>("-128").unwrap().to_string(), "-128")]
#[case::int16(bind::<i16>("32767").unwrap().to_string(), "32767")]
#[case::int32(bind::<i32>("135").unwrap().to_string(), "135")]
#[case::int64(bind::<i64>("-9000000000").unwrap().to_string(), "-9000000000")]
#[case::int128(bind::<i128>("170141183460469231731687303715884105727").unwrap().to_string(), "170141183460469231731687303715884105727")]
#[case::isize(bind::<isize>("-1").unwrap().to_string(), "-1")]
#[case::uint8(bind::<u8>("255").unwrap().to_string(), "255")]
#[case::uint16(bind::<u16>("8080").unwrap().to_string(), "8080")]
#[case::uint32(bind::<u32>("4294967295").unwrap().to_string(), "4294967295")]
#[case::uint64(bind::<u64>("18446744073709551615").unwrap().to_string(), "18446744073709551615")]
#[case::uint128(bind::<u128>("7").unwrap().to_string(), "7")]
#[case::usize(bind::<usize>("42").unwrap().to_string(), "42")]
#[case::float32(bind::<f32>("1.5").unwrap().to_string(), "1.5")]
#[case::float64(bind::<f64>("-0.25").unwrap().to_string(), "-0.25")]
#[case::boolean(bind::<bool>("true").unwrap().to_string(), "true")]
#[case::character(bind::<char>("é").unwrap().to_string(), "é")]
#[case::string(bind::<String>("hello world").unwrap(), "hello world")]
#[case::path_buf(bind::<PathBuf>("/var/tmp").unwrap().display().to_string(), "/var/tmp")]
#[case::text(bind::<Text<u16>>("443").unwrap().0.to_string(), "443")]
fn test_scalar_round_trip(#[case] bound: String, #[case] expected: &str) {
    assert_eq!(bound, expected);
}

#[rstest]
#[case::one("1", true)]
#[case::yes("YES", true)]
#[case::short("t", true)]
#[case::zero("0", false)]
#[case::no("no", false)]
#[case::short_false("F", false)]
fn test_bool_spellings(#[case] raw: &str, #[case] expected: bool) {
    assert_eq!(bind::<bool>(raw).unwrap(), expected);
}

#[rstest]
#[case::overflow(bind::<u8>("256").map(|_| ()))]
#[case::negative_unsigned(bind::<u32>("-1").map(|_| ()))]
#[case::not_a_number(bind::<i32>("abc").map(|_| ()))]
#[case::not_a_float(bind::<f64>("1.2.3").map(|_| ()))]
#[case::two_chars(bind::<char>("ab").map(|_| ()))]
#[case::bad_bool(bind::<bool>("maybe").map(|_| ()))]
fn test_invalid_scalars(#[case] bound: Result<(), Rejection>) {
    let rejection = bound.unwrap_err();
    assert_eq!(rejection.status(), http::StatusCode::BAD_REQUEST);
    assert!(matches!(rejection.error(), Error::Decode { name, .. } if name == "v"));
}

#[derive(Debug, Default, PartialEq)]
struct Celsius(f32);

impl FromStr for Celsius {
    type Err = std::num::ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_end_matches('C').parse().map(Self)
    }
}

bindery_core::unpack_text!(Celsius);

#[test]
fn test_unpack_text_macro() {
    assert_eq!(bind::<Celsius>("21.5C").unwrap(), Celsius(21.5));
    assert!(bind::<Celsius>("warm").is_err());
}

#[derive(Debug, Default, Model)]
struct Sources {
    #[bindery("path,name=id")]
    path: i64,
    #[bindery("query,name=id")]
    query: i64,
    #[bindery("header,name=X-Id")]
    header: i64,
    #[bindery("cookie,name=id")]
    cookie: i64,
}

#[rstest]
#[case::zero("0", 0)]
#[case::negative("-17", -17)]
#[case::max("9223372036854775807", i64::MAX)]
fn test_every_source(#[case] raw: &str, #[case] expected: i64) {
    let config = BinderConfig::new().with_route_params();
    let binder = ModelBinder::<Sources>::compile(&config).unwrap().unwrap();
    let request = Request::new(Method::GET, &format!("/items/{raw}?id={raw}"))
        .with_header("X-Id", raw)
        .with_header("Cookie", &format!("id={raw}"))
        .with_path_params(PathVars::from_iter([("id", raw)]));

    let sources = binder.resolve(&request).unwrap();
    assert_eq!(sources.path, expected);
    assert_eq!(sources.query, expected);
    assert_eq!(sources.header, expected);
    assert_eq!(sources.cookie, expected);
}
