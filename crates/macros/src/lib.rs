#![recursion_limit = "256"]

extern crate proc_macro;

#[macro_use] extern crate quote;
#[macro_use] extern crate synstructure;

mod api;

decl_derive!([ApiError, attributes(api)] => api::derive_error);
