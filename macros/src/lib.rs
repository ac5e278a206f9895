//! `#[tap_test]` attribute for protopixel-net's on-device test harness.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, ReturnType};

/// Register a function as a TAP test.
///
/// The function keeps its signature and is additionally submitted to
/// `protopixel_net::testing`'s registry. A function returning `()` fails by
/// panicking; one returning `Result` also fails on `Err`.
///
/// ```ignore
/// use protopixel_net_macros::tap_test;
///
/// #[tap_test]
/// fn toggle_decodes() {
///     assert_eq!(decode(&[0; 8]).unwrap(), CommandFrame::toggle(0));
/// }
/// ```
#[proc_macro_attribute]
pub fn tap_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        let msg = format!("tap_test takes no arguments, got `{}`", attr);
        return quote! { compile_error!(#msg); }.into();
    }

    let test_fn = parse_macro_input!(item as ItemFn);
    let name = &test_fn.sig.ident;
    let name_str = name.to_string();

    let invoke = match test_fn.sig.output {
        ReturnType::Default => quote! { runner.run_assert(#name_str, #name); },
        ReturnType::Type(..) => quote! { runner.run(#name_str, #name); },
    };

    quote! {
        #test_fn

        ::protopixel_net::testing::inventory::submit! {
            ::protopixel_net::testing::TapTestEntry::new(
                #name_str,
                |runner: &mut ::protopixel_net::testing::TestRunner| { #invoke }
            )
        }
    }
    .into()
}
