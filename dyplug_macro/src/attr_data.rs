// Copyright (c) 2023 Jonathan "Razordor" Alan Thomason
use syn::punctuated::Punctuated;
use syn::{spanned::Spanned, *};

#[derive(Default)]
pub struct AttrData {
	pub link_name: Option<String>,
}

impl TryFrom<Punctuated<Expr, Token!(,)>> for AttrData {
	type Error = syn::Error;
	fn try_from(value: Punctuated<Expr, Token!(,)>) -> Result<Self> {
		let mut link_name: Option<String> = None;
		let mut errors = vec![];
		const EXPECTED_KW: &str = "Expected `link_name`.";

		for expr in value.iter() {
			match expr {
				Expr::Assign(assign) => {
					let (assign_left, assign_right) = (assign.left.as_ref(), assign.right.as_ref());

					let Expr::Path(ExprPath { path, .. }) = assign_left else {
						errors.push(Error::new(assign_left.span(), EXPECTED_KW));
						continue;
					};
					if path.is_ident("link_name") {
						// Branch for syntax: #[plugin_init(link_name = <string>)]
						match assign_right {
							Expr::Lit(ExprLit {
								lit: Lit::Str(val), ..
							}) => {
								if val.value().is_empty() {
									errors.push(Error::new(val.span(), "`link_name` is empty"));
								} else if link_name.is_none() {
									link_name = Some(val.value());
								} else {
									errors.push(Error::new(
										assign.span(),
										"link_name is already defined",
									));
								}
							}
							right => errors.push(Error::new(right.span(), "Expected string.")),
						}
					} else {
						errors.push(Error::new(assign_left.span(), EXPECTED_KW));
					}
				}

				// Branch for everything else.
				expr => errors.push(Error::new(expr.span(), EXPECTED_KW)),
			}
		}

		// if there are any errors this will immediately combine and return early.
		if let Some(mut main_err) = errors.pop() {
			for err in errors {
				main_err.combine(err);
			}
			Err(main_err)
		} else {
			Ok(Self { link_name })
		}
	}
}
