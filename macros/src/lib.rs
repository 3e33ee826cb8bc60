//! Procedural macros for the virtual-memory core crate.

#![deny(warnings)]

extern crate proc_macro;

mod instrument;

use proc_macro::TokenStream;

/// Wraps a coremap/swap/fault-handler function with `trace!` entry and exit logging.
///
/// Usage: `#[instrument(name = "page_alloc")]`. The name is used as the log target; the
/// function's arguments and return value are not captured, only the fact that the call
/// happened and whether it returned `Ok`/`Err` when the return type is a `Result`.
#[proc_macro_attribute]
pub fn instrument(metadata: TokenStream, input: TokenStream) -> TokenStream {
	instrument::instrument(metadata, input)
}
