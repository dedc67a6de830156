use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemFn};

/// Proc macro to denote a Transaction
///
/// Each call is timed and counted as a request. An `Err` return counts as a failed request.
///
/// NOTE: Currently this macro only works on async functions with a `Result<T, E>` return value.
///
/// # Example
/// ```ignore
/// use stampede::prelude::*;
///
/// #[transaction]
/// async fn my_transaction(client: &Client) -> Result<StatusCode, MyError> {
///     ...
/// }
/// ```
#[proc_macro_attribute]
pub fn transaction(attr: TokenStream, item: TokenStream) -> TokenStream {
    transaction_internal(attr, item).into()
}

fn transaction_internal(_attr: TokenStream, item: TokenStream) -> TokenStream2 {
    let input = match syn::parse::<ItemFn>(item) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;
    let stmts = &block.stmts;

    quote! {
        #(#attrs)* #vis #sig {
            ::stampede::transaction::transaction_hook(async move {
                #(#stmts)*
            }).await
        }
    }
}

/// Proc macro to denote a Scenario
///
/// The function is the per-iteration action. It may take a single `Iteration` argument
/// identifying the virtual user and iteration, or no arguments at all.
///
/// See the `Scenario` struct for more information on the methods this macro provides on functions.
///
/// # Example
/// ```ignore
/// use stampede::prelude::*;
///
/// #[scenario]
/// async fn my_scenario(iteration: Iteration) {
/// }
/// ```
#[proc_macro_attribute]
pub fn scenario(attr: TokenStream, item: TokenStream) -> TokenStream {
    scenario_internal(attr, item).into()
}

fn scenario_internal(_attr: TokenStream, item: TokenStream) -> TokenStream2 {
    let input = match syn::parse::<ItemFn>(item) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(&input.sig, "#[scenario] requires an async fn")
            .to_compile_error();
    }

    if input.sig.inputs.len() > 1 {
        return syn::Error::new_spanned(
            &input.sig.inputs,
            "#[scenario] functions take at most one `Iteration` argument",
        )
        .to_compile_error();
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;
    let stmts = &block.stmts;

    let new_name = Ident::new(&format!("__stampede_{}", sig.ident), Span::call_site());
    let mut new_sig = sig.clone();
    new_sig.ident = new_name.clone();

    let action = if sig.inputs.is_empty() {
        quote! { |_: ::stampede::Iteration| #new_name() }
    } else {
        quote! { #new_name }
    };

    let mut scen_sig = sig.clone();
    let scen_name = sig.ident.clone();
    scen_sig.asyncness = None;
    scen_sig.inputs.clear();
    scen_sig.output = syn::parse(
        quote! {
            -> impl ::stampede::scenario::ConfigurableScenario<::stampede::RunSummary>
        }
        .into(),
    )
    .expect("Scenario signature is invalid");

    quote! {
        #(#attrs)* #vis #scen_sig {
            ::stampede::scenario::Scenario::new(stringify!(#scen_name), #action)
        }

        #(#attrs)* #vis #new_sig {
            #(#stmts)*
        }
    }
}
