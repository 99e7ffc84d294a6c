// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use quote::*;

use proc_macro::TokenStream as TokenStream1;
use proc_macro2::TokenStream as TokenStream2;
use syn::{parse::Parser, punctuated::Punctuated, Expr, Token};

mod attr_data;
mod diagnostic;
use attr_data::*;

/// Keep in sync with `dyplug::INIT_SYMBOL`.
const INIT_SYMBOL: &str = "__dyplug_static_init";

/// Exports the annotated function as the plugin's init entry point.
///
/// The function must take a single `&mut dyplug::Registrar<'_>` and return nothing.
/// `#[plugin_init(link_name = "...")]` changes the exported symbol name.
#[proc_macro_attribute]
pub fn plugin_init(args: TokenStream1, input: TokenStream1) -> TokenStream1 {
	let args = TokenStream2::from(args);
	let input = TokenStream2::from(input);
	let fn_item = match syn::parse2::<syn::ItemFn>(input) {
		Ok(fn_item) => fn_item,
		Err(e) => return e.into_compile_error().into(),
	};

	let attr = if args.is_empty() {
		AttrData::default()
	} else {
		let punct = match Parser::parse2(Punctuated::<Expr, Token!(,)>::parse_terminated, args) {
			Ok(punct) => punct,
			Err(e) => return e.into_compile_error().into(),
		};
		match AttrData::try_from(punct) {
			Ok(attr) => attr,
			Err(e) => return e.into_compile_error().into(),
		}
	};

	if let Err(e) = diagnostic::check_signature(&fn_item.sig) {
		return e.into_compile_error().into();
	}

	TokenStream1::from(expand(&fn_item, &attr))
}

fn expand(fn_item: &syn::ItemFn, attr: &AttrData) -> TokenStream2 {
	let fn_name = &fn_item.sig.ident;
	let link_name = attr.link_name.as_deref().unwrap_or(INIT_SYMBOL);
	let call = if fn_item.sig.unsafety.is_some() {
		quote!(unsafe { #fn_name(registrar) })
	} else {
		quote!(#fn_name(registrar))
	};

	// The entry point is a plain Rust function; host and plugin must be built by the
	// same compiler for the `Registrar` layout to match.
	quote! {
		#fn_item

		#[doc(hidden)]
		#[export_name = #link_name]
		pub unsafe fn __dyplug_static_init(registrar: &mut ::dyplug::Registrar<'_>) {
			#call
		}
	}
}
