//! Procedural macros for the lathe HTTP runtime.
//!
//! This crate provides the `#[controller]` attribute macro, which turns an
//! async function into a root controller.
//!
//! # Example
//!
//! ```ignore
//! use lathe::prelude::*;
//!
//! #[controller(name = "site")]
//! async fn site(ctx: &mut RequestContext, segments: Vec<String>) -> Result<Body, DispatchError> {
//!     match segments.as_slice() {
//!         [] => Ok(Body::from("Index")),
//!         _ => Err(HttpStatus::not_found().into()),
//!     }
//! }
//!
//! let dispatcher = Dispatcher::new(SiteController::new(), AppConfig::new());
//! ```

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, punctuated::Punctuated, Expr, ExprLit, FnArg, ItemFn, Lit, Meta, Token,
};

/// Attributes for the `#[controller]` macro.
#[derive(Default, Debug)]
struct ControllerAttrs {
    /// Name reported by `Controller::name`.
    name: Option<String>,
}

impl ControllerAttrs {
    fn parse_meta_list(metas: Punctuated<Meta, Token![,]>) -> syn::Result<Self> {
        let mut attrs = ControllerAttrs::default();

        for meta in metas {
            match meta {
                Meta::NameValue(nv) => {
                    let ident = nv
                        .path
                        .get_ident()
                        .ok_or_else(|| syn::Error::new_spanned(&nv.path, "expected identifier"))?
                        .to_string();

                    let lit = match &nv.value {
                        Expr::Lit(ExprLit { lit, .. }) => lit.clone(),
                        _ => return Err(syn::Error::new_spanned(&nv.value, "expected literal")),
                    };

                    match (ident.as_str(), lit) {
                        ("name", Lit::Str(lit_str)) => attrs.name = Some(lit_str.value()),
                        ("name", other) => {
                            return Err(syn::Error::new_spanned(other, "expected string literal"))
                        }
                        _ => {
                            return Err(syn::Error::new_spanned(
                                nv.path,
                                format!("unknown attribute: {}", ident),
                            ));
                        }
                    }
                }
                _ => {
                    return Err(syn::Error::new_spanned(meta, "expected name = value"));
                }
            }
        }

        Ok(attrs)
    }
}

/// Turn an async function into a root controller.
///
/// The function must be `async` and take exactly two arguments, the
/// request context and the path segments:
///
/// ```ignore
/// async fn f(ctx: &mut RequestContext, segments: Vec<String>) -> Result<Body, DispatchError>
/// ```
///
/// A unit struct named `<PascalCase>Controller` implementing
/// `lathe::app::Controller` is generated next to the function, which is
/// kept as written.
///
/// # Attributes
///
/// - `name` (optional): name reported in logs, defaults to the function name
#[proc_macro_attribute]
pub fn controller(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args with Punctuated::<Meta, Token![,]>::parse_terminated);
    let input_fn = parse_macro_input!(input as ItemFn);

    match generate_controller(args, input_fn) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn generate_controller(
    args: Punctuated<Meta, Token![,]>,
    input_fn: ItemFn,
) -> syn::Result<proc_macro2::TokenStream> {
    let attrs = ControllerAttrs::parse_meta_list(args)?;

    if input_fn.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input_fn.sig,
            "controller must be async",
        ));
    }

    let typed_args = input_fn
        .sig
        .inputs
        .iter()
        .filter(|arg| matches!(arg, FnArg::Typed(_)))
        .count();
    if typed_args != 2 || input_fn.sig.inputs.len() != 2 {
        return Err(syn::Error::new_spanned(
            &input_fn.sig.inputs,
            "controller must take (ctx: &mut RequestContext, segments: Vec<String>)",
        ));
    }

    let fn_name = &input_fn.sig.ident;
    let fn_vis = &input_fn.vis;
    let struct_name = format_ident!("{}Controller", to_pascal_case(&fn_name.to_string()));
    let controller_name = attrs.name.unwrap_or_else(|| fn_name.to_string());

    let expanded = quote! {
        /// Generated root controller.
        #[derive(Debug, Default, Clone, Copy)]
        #fn_vis struct #struct_name;

        impl #struct_name {
            /// Create a new instance of the controller.
            pub fn new() -> Self {
                Self
            }
        }

        #[lathe::prelude::async_trait]
        impl lathe::app::Controller for #struct_name {
            async fn call(
                &self,
                ctx: &mut lathe::app::RequestContext,
                segments: ::std::vec::Vec<::std::string::String>,
            ) -> ::std::result::Result<lathe::app::Body, lathe::app::DispatchError> {
                #fn_name(ctx, segments).await
            }

            fn name(&self) -> &str {
                #controller_name
            }
        }

        #input_fn
    };

    Ok(expanded)
}

/// Convert a snake_case string to PascalCase.
fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}
