//! Derive macro for error enums.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations.
//! Replacement for the `thiserror` crate, limited to enums since every
//! error type in this project is one.
//!
//! # Usage
//!
//! ```ignore
//! use um_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MachineError {
//!     #[error("illegal opcode {0}")]
//!     IllegalOpcode(u8),
//!
//!     #[error("array {handle} has no word at offset {offset}")]
//!     OutOfBounds { handle: u32, offset: u32 },
//!
//!     #[error("division by zero")]
//!     DivisionByZero,
//! }
//! ```
//!
//! Unit variants take a plain message, tuple variants interpolate `{0}`,
//! `{1}`, ... and struct variants interpolate `{field_name}`.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

/// Derives `Display` and `Error` for an enum.
///
/// Every variant must carry an `#[error("...")]` attribute with the
/// message to display for it.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error can only be derived for enums",
        ));
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let arms = data
        .variants
        .iter()
        .map(display_arm)
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Builds one `match` arm writing the variant's `#[error]` message.
fn display_arm(variant: &syn::Variant) -> syn::Result<proc_macro2::TokenStream> {
    let name = &variant.ident;
    let message = error_message(variant)?;

    Ok(match &variant.fields {
        Fields::Unit => quote! {
            Self::#name => write!(f, #message),
        },
        Fields::Unnamed(fields) => {
            let bindings: Vec<_> = (0..fields.unnamed.len())
                .map(|i| format_ident!("f{}", i))
                .collect();
            let message = positional_to_named(&message, fields.unnamed.len());
            quote! {
                Self::#name(#(#bindings),*) => write!(f, #message, #(#bindings = #bindings),*),
            }
        }
        Fields::Named(fields) => {
            let bindings: Vec<_> = fields.named.iter().map(|field| &field.ident).collect();
            quote! {
                Self::#name { #(#bindings),* } => write!(f, #message, #(#bindings = #bindings),*),
            }
        }
    })
}

/// Extracts the string from a variant's `#[error("...")]` attribute.
fn error_message(variant: &syn::Variant) -> syn::Result<String> {
    for attr in &variant.attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")]",
            ));
        };
        let Ok(Lit::Str(message)) = syn::parse2::<Lit>(list.tokens.clone()) else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute: message must be a string literal, \
                 e.g. #[error(\"illegal opcode {0}\")]",
            ));
        };
        return Ok(message.value());
    }

    Err(syn::Error::new_spanned(
        variant,
        format!(
            "missing #[error(\"...\")] attribute on variant `{}`",
            variant.ident
        ),
    ))
}

/// Rewrites positional format args `{0}`, `{1}` to the named bindings
/// `{f0}`, `{f1}` introduced by the tuple-variant match arm.
fn positional_to_named(message: &str, field_count: usize) -> String {
    let mut message = message.to_string();
    for i in (0..field_count).rev() {
        message = message.replace(&format!("{{{i}}}"), &format!("{{f{i}}}"));
    }
    message
}
