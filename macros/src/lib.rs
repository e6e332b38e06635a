//! Proc macros for update-coalescer: `#[derive(Patch)]`.
//!
//! This crate is not meant to be used directly — enable the `macros` feature on `update-coalescer`.

use proc_macro::TokenStream;

mod patch_derive;

/// Derive `update_coalescer::Patch` for a struct whose fields are all `Option<_>`.
///
/// - `is_empty` is true when every field is `None`.
/// - `merge` copies each `Some` field of the incoming patch over the
///   accumulated one; `None` fields leave the accumulated value untouched.
///
/// # Example
///
/// ```ignore
/// #[derive(Patch, Default)]
/// struct UserPatch {
///     name: Option<String>,
///     email: Option<String>,
/// }
/// ```
#[proc_macro_derive(Patch)]
pub fn derive_patch(input: TokenStream) -> TokenStream {
    patch_derive::patch_impl(input.into())
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
