use proc_macro2::{Delimiter, Group, TokenStream, TokenTree};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Attribute, Block, Expr, ItemFn, Meta, MetaNameValue, Token, parse_quote};

struct Messages {
    message: Expr,
    finished: Expr,
}

impl Parse for Messages {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let span = input.span();
        let mut message = None;
        let mut finished = None;

        for arg in Punctuated::<MetaNameValue, Token![,]>::parse_terminated(input)? {
            let slot = if arg.path.is_ident("message") {
                &mut message
            } else if arg.path.is_ident("finished") {
                &mut finished
            } else {
                return Err(syn::Error::new_spanned(
                    &arg.path,
                    "expected `message` or `finished`",
                ));
            };
            if slot.is_some() {
                return Err(syn::Error::new_spanned(&arg.path, "argument given twice"));
            }
            *slot = Some(arg.value);
        }

        Ok(Self {
            message: message.ok_or_else(|| syn::Error::new(span, "missing `message = ...`"))?,
            finished: finished.ok_or_else(|| syn::Error::new(span, "missing `finished = ...`"))?,
        })
    }
}

pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let Messages { message, finished } = syn::parse2(attr)?;
    let mut function: ItemFn = syn::parse2(item)?;

    match function.attrs.iter_mut().find(|attr| is_instrument(attr)) {
        Some(attr) => {
            let path = attr.path().clone();
            let args = match &attr.meta {
                Meta::List(list) => list.tokens.clone(),
                Meta::Path(_) | Meta::NameValue(_) => TokenStream::new(),
            };
            let args = with_progress_field(args);
            *attr = parse_quote!(#[#path(#args)]);
        }
        None => function
            .attrs
            .push(parse_quote!(#[::tracing::instrument(fields(progress = true))])),
    }

    let body = &function.block;
    let block: Block = parse_quote!({
        {
            use ::tracing_indicatif::span_ext::IndicatifSpanExt as _;
            let span = ::tracing::Span::current();
            span.pb_set_message(#message);
            span.pb_set_finish_message(&#finished);
        }
        #body
    });
    *function.block = block;

    Ok(quote!(#function))
}

fn is_instrument(attr: &Attribute) -> bool {
    attr.path()
        .segments
        .last()
        .is_some_and(|segment| segment.ident == "instrument")
}

/// Adds `progress = true` to the `fields(...)` of `#[instrument]` arguments.
fn with_progress_field(args: TokenStream) -> TokenStream {
    let mut tokens = args.into_iter().peekable();
    let mut output = TokenStream::new();
    let mut found = false;

    while let Some(token) = tokens.next() {
        let is_fields = matches!(&token, TokenTree::Ident(ident) if ident == "fields");
        output.extend([token]);
        if is_fields
            && let Some(TokenTree::Group(group)) = tokens.peek()
            && group.delimiter() == Delimiter::Parenthesis
        {
            let mut fields = Group::new(
                Delimiter::Parenthesis,
                append(group.stream(), quote!(progress = true)),
            );
            fields.set_span(group.span());
            tokens.next();
            output.extend([TokenTree::Group(fields)]);
            found = true;
        }
    }

    if found {
        output
    } else {
        append(output, quote!(fields(progress = true)))
    }
}

/// Appends one comma-separated item, tolerating a trailing comma.
fn append(list: TokenStream, item: TokenStream) -> TokenStream {
    let trailing_comma = matches!(
        list.clone().into_iter().last(),
        Some(TokenTree::Punct(punct)) if punct.as_char() == ','
    );
    if list.is_empty() || trailing_comma {
        quote!(#list #item)
    } else {
        quote!(#list, #item)
    }
}
