//! Procedural macros for sitedocs
//!
//! This crate provides macros to reduce boilerplate in the sitedocs backend:
//!
//! - `closed_enum!` - Generate closed string enums backing the enum registry

use convert_case::{Case, Casing};
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{
    Attribute, Ident, LitStr, Token, Visibility, braced, parse::Parse, parse::ParseStream,
    parse_macro_input,
};

/// Generate a closed string enum with its wire values and registry metadata.
///
/// # Usage
///
/// ```ignore
/// closed_enum! {
///     /// Milestone and task health.
///     pub enum Status {
///         OnTrack,
///         AtRisk,
///     }
/// }
///
/// // Explicit wire values when the flat-case default does not fit
/// closed_enum! {
///     pub enum ReportType as "ReportType" {
///         Daily = "daily",
///         Annually = "annually",
///     }
/// }
/// ```
///
/// # Generated Code
///
/// For each enum the macro emits:
///
/// - the enum itself (`Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord`)
/// - `VALUES` / `ALL` constants in declaration order
/// - `as_str()` and `parse()` inherent methods
/// - `Display`, `FromStr`, `From<Self>` for `String` and `FieldValue`
/// - `serde::Serialize` / `serde::Deserialize` using the wire values
/// - an impl of `crate::schema::enums::ClosedEnum`
///
/// Variants without an explicit value use the flat-case form of their name
/// (`OnTrack` becomes `"ontrack"`). The registry name defaults to the enum
/// identifier.
#[proc_macro]
pub fn closed_enum(input: TokenStream) -> TokenStream {
    let parsed = parse_macro_input!(input as ClosedEnumInput);

    let attrs = &parsed.attrs;
    let vis = &parsed.vis;
    let name = &parsed.name;
    let registry_name = parsed
        .registry_name
        .as_ref()
        .map(LitStr::value)
        .unwrap_or_else(|| name.to_string());

    let variant_attrs: Vec<_> = parsed.variants.iter().map(|v| &v.attrs).collect();
    let idents: Vec<_> = parsed.variants.iter().map(|v| &v.ident).collect();
    let values: Vec<String> = parsed
        .variants
        .iter()
        .map(|v| {
            v.value
                .as_ref()
                .map(LitStr::value)
                .unwrap_or_else(|| v.ident.to_string().to_case(Case::Flat))
        })
        .collect();

    let output = quote! {
        #(#attrs)*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #vis enum #name {
            #(
                #(#variant_attrs)*
                #idents,
            )*
        }

        impl #name {
            /// Wire values in declaration order.
            pub const VALUES: &'static [&'static str] = &[#(#values),*];

            /// Every variant in declaration order.
            pub const ALL: &'static [#name] = &[#(#name::#idents),*];

            /// The wire value for this variant.
            pub fn as_str(&self) -> &'static str {
                match self {
                    #(#name::#idents => #values,)*
                }
            }

            /// Look up a variant by its exact wire value.
            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    #(#values => Some(#name::#idents),)*
                    _ => None,
                }
            }
        }

        impl crate::schema::enums::ClosedEnum for #name {
            const NAME: &'static str = #registry_name;
            const VALUES: &'static [&'static str] = #name::VALUES;

            fn as_str(&self) -> &'static str {
                #name::as_str(self)
            }

            fn parse(value: &str) -> Option<Self> {
                #name::parse(value)
            }
        }

        impl ::std::fmt::Display for #name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for #name {
            type Err = crate::error::ValidationError;

            fn from_str(value: &str) -> ::std::result::Result<Self, Self::Err> {
                #name::parse(value).ok_or_else(|| {
                    crate::schema::enums::invalid_enum_value(#registry_name, #name::VALUES, value, &[])
                })
            }
        }

        impl ::std::convert::From<#name> for ::std::string::String {
            fn from(value: #name) -> Self {
                value.as_str().to_string()
            }
        }

        impl ::std::convert::From<#name> for crate::schema::value::FieldValue {
            fn from(value: #name) -> Self {
                crate::schema::value::FieldValue::Enum(value.as_str().to_string())
            }
        }

        impl ::serde::Serialize for #name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for #name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let raw = <::std::string::String as ::serde::Deserialize>::deserialize(deserializer)?;
                #name::parse(&raw).ok_or_else(|| {
                    <D::Error as ::serde::de::Error>::unknown_variant(&raw, #name::VALUES)
                })
            }
        }
    };
    output.into()
}

/// Input for closed_enum! macro
struct ClosedEnumInput {
    attrs: Vec<Attribute>,
    vis: Visibility,
    name: Ident,
    registry_name: Option<LitStr>,
    variants: Punctuated<VariantInput, Token![,]>,
}

/// A single `Variant` or `Variant = "value"` entry
struct VariantInput {
    attrs: Vec<Attribute>,
    ident: Ident,
    value: Option<LitStr>,
}

impl Parse for ClosedEnumInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let vis: Visibility = input.parse()?;
        input.parse::<Token![enum]>()?;
        let name: Ident = input.parse()?;

        let registry_name = if input.peek(Token![as]) {
            input.parse::<Token![as]>()?;
            Some(input.parse::<LitStr>()?)
        } else {
            None
        };

        let content;
        braced!(content in input);
        let variants = content.parse_terminated(VariantInput::parse, Token![,])?;

        if variants.is_empty() {
            return Err(syn::Error::new(
                name.span(),
                "closed_enum! requires at least one variant",
            ));
        }

        Ok(ClosedEnumInput {
            attrs,
            vis,
            name,
            registry_name,
            variants,
        })
    }
}

impl Parse for VariantInput {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let ident: Ident = input.parse()?;

        let value = if input.peek(Token![=]) {
            input.parse::<Token![=]>()?;
            Some(input.parse::<LitStr>()?)
        } else {
            None
        };

        Ok(VariantInput {
            attrs,
            ident,
            value,
        })
    }
}
