//! A derive macro writing the `Model` descriptor table of a struct.
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, GenericArgument, LitStr,
    PathArguments, Type,
};

const DEFAULT_TAG: &str = "bindery";

pub(super) fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "`Model` cannot be derived for generic structs; implement it by hand",
        ));
    }
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "`Model` can only be derived for structs with named fields",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            name,
            "`Model` can only be derived for structs with named fields",
        ));
    };

    let mut descriptors = Vec::new();
    for field in &fields.named {
        let Some(ident) = &field.ident else {
            continue;
        };
        let field_name = ident.unraw().to_string();
        let tags = collect_tags(&field.attrs)?;
        let binding = Binding::of(&tags);

        let keys = tags.iter().map(|(key, _)| key);
        let values = tags.iter().map(|(_, value)| value);
        let access = quote! { |model: &mut Self| &mut model.#ident };
        let mut descriptor = quote! {
            ::bindery_core::Field::new(#field_name, &[#((#keys, #values)),*])
        };
        if binding.unpack {
            descriptor = quote! { #descriptor.unpack(#access) };
        }
        if binding.content {
            descriptor = content_binding(descriptor, &access, &field.ty)?;
        }
        if binding.body {
            descriptor = quote! { #descriptor.body(#access) };
        }
        descriptors.push(descriptor);
    }

    Ok(quote! {
        #[automatically_derived]
        impl ::bindery_core::Model for #name {
            fn fields() -> ::std::vec::Vec<::bindery_core::Field<Self>> {
                ::std::vec![#(#descriptors),*]
            }
        }

        #[automatically_derived]
        impl ::bindery_core::Unpack for #name {
            const SHAPE: ::bindery_core::Shape = ::bindery_core::Shape::Struct;

            fn unpacker(
                cx: &::bindery_core::Context<'_>,
            ) -> ::bindery_core::Result<::bindery_core::Unpacker<Self>> {
                ::bindery_core::model::struct_unpacker::<Self>(cx)
            }
        }
    })
}

/// `(tag key, tag value)` pairs from `#[bindery("...")]` and `#[tag(key = "...")]`
fn collect_tags(attrs: &[Attribute]) -> syn::Result<Vec<(String, String)>> {
    let mut tags = Vec::new();
    for attr in attrs {
        if attr.path().is_ident(DEFAULT_TAG) {
            let value: LitStr = attr.parse_args().map_err(|_| {
                syn::Error::new_spanned(attr, "expected `#[bindery(\"<base>[,key=value]*\")]`")
            })?;
            push_tag(&mut tags, DEFAULT_TAG.to_string(), &value)?;
        } else if attr.path().is_ident("tag") {
            attr.parse_nested_meta(|meta| {
                let key = meta
                    .path
                    .get_ident()
                    .map(|ident| ident.unraw().to_string())
                    .ok_or_else(|| meta.error("expected `key = \"...\"`"))?;
                let value: LitStr = meta.value()?.parse()?;
                push_tag(&mut tags, key, &value)
            })?;
        }
    }
    Ok(tags)
}

fn push_tag(tags: &mut Vec<(String, String)>, key: String, value: &LitStr) -> syn::Result<()> {
    if tags.iter().any(|(k, _)| *k == key) {
        return Err(syn::Error::new_spanned(
            value,
            format!("tag `{key}` is given more than once"),
        ));
    }
    tags.push((key, value.value()));
    Ok(())
}

/// Which bindings a field gets, judged from all of its tags
#[derive(Debug, Default, PartialEq, Eq)]
struct Binding {
    unpack: bool,
    content: bool,
    body: bool,
}

impl Binding {
    fn of(tags: &[(String, String)]) -> Self {
        if tags.is_empty() {
            return Self {
                unpack: true,
                ..Self::default()
            };
        }
        let mut binding = Self::default();
        for (_, value) in tags {
            let mut parts = value.split(',');
            let base = parts.next().unwrap_or_default().trim();
            if base == "-" {
                continue;
            }
            if base == "model" {
                binding.body = true;
            } else if parts.any(|part| part.split('=').next().unwrap_or_default().trim() == "content") {
                binding.content = true;
            } else {
                binding.unpack = true;
            }
        }
        binding
    }
}

/// Pick the content binding matching the field's container type
fn content_binding(
    descriptor: TokenStream2,
    access: &TokenStream2,
    ty: &Type,
) -> syn::Result<TokenStream2> {
    let Some((container, args)) = last_segment(ty) else {
        return Ok(quote! { #descriptor.content(#access) });
    };
    match container.as_str() {
        "Vec" => Ok(quote! { #descriptor.content_sequence(#access) }),
        "HashMap" | "BTreeMap" => {
            let [key, value] = args.as_slice() else {
                return Err(syn::Error::new_spanned(
                    ty,
                    "`content=` maps need explicit key and value types",
                ));
            };
            Ok(quote! { #descriptor.content_map::<#ty, #key, #value>(#access) })
        }
        _ => Ok(quote! { #descriptor.content(#access) }),
    }
}

/// Name and leading type arguments of a path type's last segment
fn last_segment(ty: &Type) -> Option<(String, Vec<&Type>)> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    let args = match &segment.arguments {
        PathArguments::AngleBracketed(generics) => generics
            .args
            .iter()
            .filter_map(|arg| match arg {
                GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .take(2)
            .collect(),
        _ => Vec::new(),
    };
    Some((segment.ident.to_string(), args))
}
