//! derive(Patch): generate a field-wise shallow merge for `Option` structs.

use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, Error, Fields, GenericArgument, Ident, PathArguments, Result, Type};

// ---------------------------------------------------------------------------
// Field inspection
// ---------------------------------------------------------------------------

/// Whether `ty` is spelled `Option<T>` (optionally path-qualified).
fn is_option(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };
    if path.qself.is_some() {
        return false;
    }
    let Some(last) = path.path.segments.last() else {
        return false;
    };
    if last.ident != "Option" {
        return false;
    }
    match &last.arguments {
        PathArguments::AngleBracketed(args) => {
            args.args.len() == 1 && matches!(args.args[0], GenericArgument::Type(_))
        }
        _ => false,
    }
}

/// Collect the field names of a named-field struct, checking every field is
/// an `Option`.
fn option_fields(input: &DeriveInput) -> Result<Vec<Ident>> {
    let Data::Struct(data) = &input.data else {
        return Err(Error::new_spanned(
            &input.ident,
            "Patch can only be derived for structs",
        ));
    };
    let Fields::Named(named) = &data.fields else {
        return Err(Error::new_spanned(
            &input.ident,
            "Patch can only be derived for structs with named fields",
        ));
    };

    let mut idents = Vec::new();
    for field in &named.named {
        if !is_option(&field.ty) {
            return Err(Error::new_spanned(
                &field.ty,
                "Patch fields must be `Option<_>`",
            ));
        }
        if let Some(ident) = &field.ident {
            idents.push(ident.clone());
        }
    }

    if idents.is_empty() {
        return Err(Error::new(
            Span::call_site(),
            "Patch requires at least one field",
        ));
    }
    Ok(idents)
}

// ---------------------------------------------------------------------------
// Code generation
// ---------------------------------------------------------------------------

/// Entry point: generate the `Patch` impl.
pub(crate) fn patch_impl(input: TokenStream) -> Result<TokenStream> {
    let parsed: DeriveInput = syn::parse2(input)?;
    let fields = option_fields(&parsed)?;

    let name = &parsed.ident;
    let (impl_generics, ty_generics, where_clause) = parsed.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::update_coalescer::Patch for #name #ty_generics #where_clause {
            fn is_empty(&self) -> bool {
                true #(&& self.#fields.is_none())*
            }

            fn merge(&mut self, other: Self) {
                #(
                    if let ::core::option::Option::Some(value) = other.#fields {
                        self.#fields = ::core::option::Option::Some(value);
                    }
                )*
            }
        }
    })
}

// ===========================================================================
// Tests
// ===========================================================================
