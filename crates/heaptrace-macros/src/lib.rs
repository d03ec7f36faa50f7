use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemFn, parse_macro_input};

/// Arms the heap tracker's concurrency gate on entry to `main` and attributes allocations made
/// directly in `main` to it.
///
/// Targets `heaptrace::TRACKER` by default; use `#[heaptrace::main(tracker = PATH)]` for a
/// tracker of your own. Without the `heaptrace` feature the function is left as written.
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut tracker: Option<syn::Path> = None;
    let args_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("tracker") {
            tracker = Some(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported heaptrace::main argument, expected `tracker = PATH`"))
        }
    });
    parse_macro_input!(attr with args_parser);

    let input = parse_macro_input!(item as ItemFn);
    if !cfg!(feature = "heaptrace") {
        return quote! { #input }.into();
    }

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    let arm = match tracker {
        Some(path) => quote! { #path.arm(); },
        None => quote! { ::heaptrace::arm(); },
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #arm
            let _heaptrace_site = ::heaptrace::CallSite::enter(::heaptrace::call_site!());
            #block
        }
    };

    output.into()
}

/// Attributes heap allocations made while the function runs to the function itself.
///
/// Nested tracked functions take over attribution until they return. Without the `heaptrace`
/// feature the function is left as written.
#[proc_macro_attribute]
pub fn track(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    if !cfg!(feature = "heaptrace") {
        return quote! { #input }.into();
    }

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;

    if let Some(asyncness) = &sig.asyncness {
        return syn::Error::new_spanned(
            asyncness,
            "#[heaptrace::track] does not support async functions: call sites are per thread",
        )
        .to_compile_error()
        .into();
    }

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            let _heaptrace_site = ::heaptrace::CallSite::enter(::heaptrace::call_site!());
            #block
        }
    };

    output.into()
}
