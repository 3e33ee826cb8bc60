//! Implementation of the [`instrument`](crate::instrument) attribute macro.

use proc_macro::TokenStream;
use proc_macro2::TokenTree;
use quote::{quote, ToTokens};
use syn::{parse_macro_input, ItemFn};

fn parse_name(metadata: proc_macro2::TokenStream) -> String {
	let toks: Vec<_> = metadata.into_iter().collect();
	let [TokenTree::Ident(name), TokenTree::Punct(eq), TokenTree::Literal(value)] = &toks[..]
	else {
		panic!("expected `name = \"...\"`");
	};
	if name != "name" || eq.as_char() != '=' {
		panic!("expected `name = \"...\"`");
	}
	value.to_string().trim_matches('"').to_string()
}

pub fn instrument(metadata: TokenStream, input: TokenStream) -> TokenStream {
	let metadata = proc_macro2::TokenStream::from(metadata);
	let name = parse_name(metadata);
	let mut input = parse_macro_input!(input as ItemFn);
	let block = input.block;
	input.block = Box::new(
		syn::parse2(quote! {
			{
				::log::trace!(target: "vmcore", "{} enter", #name);
				let __ret = (move || #block)();
				::log::trace!(target: "vmcore", "{} exit", #name);
				__ret
			}
		})
		.expect("instrument: failed to rebuild function body"),
	);
	input.into_token_stream().into()
}
