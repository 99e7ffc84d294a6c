// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use syn::spanned::Spanned;

// Rejects signatures the exported entry point cannot forward to.
pub(crate) fn check_signature(sig: &syn::Signature) -> syn::Result<()> {
	let mut errors = vec![];
	if let Some(asyncness) = &sig.asyncness {
		errors.push(syn::Error::new(
			asyncness.span(),
			"plugin init functions cannot be `async`",
		));
	}
	if let Some(abi) = &sig.abi {
		errors.push(syn::Error::new(
			abi.span(),
			"plugin init functions use the Rust ABI",
		));
	}
	if sig.generics.type_params().next().is_some() {
		errors.push(syn::Error::new(
			sig.generics.span(),
			"plugin init functions cannot be generic",
		));
	}
	if let syn::ReturnType::Type(_, ty) = &sig.output {
		errors.push(syn::Error::new(
			ty.span(),
			"plugin init functions cannot return a value",
		));
	}
	match sig.inputs.len() {
		1 => {
			if let Some(syn::FnArg::Receiver(rec)) = sig.inputs.first() {
				errors.push(syn::Error::new(rec.span(), "`self` arguments are unsupported"));
			}
		}
		_ => errors.push(syn::Error::new(
			sig.inputs.span(),
			"expected a single `&mut Registrar` argument",
		)),
	}

	if let Some(mut main_err) = errors.pop() {
		for err in errors {
			main_err.combine(err);
		}
		Err(main_err)
	} else {
		Ok(())
	}
}
