use proc_macro::TokenStream;

mod progress;

/// Shows an instrumented function's span as a progress spinner.
///
/// `#[progress(message = <expr>, finished = <expr>)]` adds `progress = true` to the
/// function's `#[instrument(fields(...))]`, or adds an `#[instrument]` when there is none.
/// The spinner shows `message` while the span is open and `finished` once it closes.
/// The function body may override the finish message, e.g. on failure.
#[proc_macro_attribute]
pub fn progress(attr: TokenStream, item: TokenStream) -> TokenStream {
    progress::expand(attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
