//! # Bindery Macros
//!
//! Procedural macros for bindery.
//!
//! - `#[derive(Model)]` writes the field descriptor table of a request model
//!   and makes the struct usable as a nested struct-valued parameter.

use proc_macro::TokenStream;

mod model;

/// Derive `bindery_core::Model` and `bindery_core::Unpack` for a struct
///
/// Tags are read from two attribute forms:
///
/// ```ignore
/// #[derive(Default, Model)]
/// struct Request {
///     #[bindery("query,name=q")]
///     search: String,
///     #[tag(bindery = "header,name=X-Token", api = "header")]
///     token: Option<String>,
///     #[bindery("model")]
///     body: Payload,
/// }
/// ```
///
/// Each field is bound according to all of its tags:
///
/// - `model` decodes the field from the body (the type must be `Deserialize`)
/// - `content=<type>` decodes through a content decoder (the type must be
///   `Deserialize`; `Vec` and map fields decode exploded values one by one)
/// - any other tag, or no tag at all, decodes through `Unpack`
/// - fields whose only tags are `-` get no binding
///
/// Untagged fields still need an `Unpack` type, because they bind as members
/// when the struct is used as a nested parameter. Tag a field `-` to keep a
/// type without `Unpack` on the model:
///
/// ```ignore
/// #[derive(Default, Model)]
/// struct Search {
///     #[bindery("query")]
///     q: String,
///     #[bindery("-")]
///     started: Option<std::time::Instant>,
/// }
/// ```
#[proc_macro_derive(Model, attributes(bindery, tag))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive_model(input)
}
