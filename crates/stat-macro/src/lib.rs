// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

use proc_macro::TokenStream;
use quote::format_ident;
use quote::quote;
use syn::DeriveInput;
use syn::Field;
use syn::FieldsNamed;
use syn::FieldsUnnamed;
use syn::Ident;
use syn::parse_macro_input;

/// Generate a [`manifold::stat::StatProvider`] implementation given a
/// struct of named fields of type [`manifold::stat::StatU64`].
///
/// ```Rust
/// #[derive(StatProvider)]
/// struct LbStats {
///     in_pkts: StatU64,
///     out_pkts: StatU64,
/// }
/// ```
///
/// This macro generates the following code based on the struct above.
///
/// ```Rust
/// impl StatProvider for LbStats {
///     const NUM_FIELDS: u32 = 2;
///
///     fn init(&mut self) -> result::Result<(), stat::Error> {
///         self.in_pkts.init("in_pkts")?;
///         self.out_pkts.init("out_pkts")?;
///         Ok(())
///     }
///
///     fn new() -> Self {
///         Self {
///             in_pkts: StatU64::new(),
///             out_pkts: StatU64::new(),
///         }
///     }
/// }
/// ````
#[proc_macro_derive(StatProvider)]
pub fn derive_stat_provider(input: TokenStream) -> TokenStream {
    let DeriveInput { ident, data, .. } = parse_macro_input!(input);
    let fields: Vec<Field> = match data {
        syn::Data::Struct(s) => match s.fields {
            syn::Fields::Named(FieldsNamed { named, .. }) => {
                named.into_iter().collect()
            }

            syn::Fields::Unnamed(FieldsUnnamed { unnamed: _, .. }) => {
                panic!("A StatProvider cannot have unnamed fields");
            }

            syn::Fields::Unit => {
                panic!("A unit struct cannot be a StatProvider");
            }
        },

        _ => panic!("Only a struct may be a StatProvider"),
    };

    let num_fields = fields.len() as u32;
    let fields_ident: Vec<Ident> =
        fields.iter().map(|f| f.ident.clone().unwrap()).collect();
    let ident_snap = format_ident!("{}Snap", ident);

    let output = quote! {
        #[derive(Clone, Debug)]
        pub struct #ident_snap {
            #( pub #fields_ident: u64, )*
        }

        impl StatProvider for #ident {
            const NUM_FIELDS: u32 = #num_fields;
            type Snap = #ident_snap;

            fn init(
                &mut self
            ) -> core::result::Result<(), ::manifold::stat::Error> {
                #( self.#fields_ident.init(stringify!(#fields_ident))?; )*
                Ok(())
            }

            fn new() -> Self {
                use ::manifold::stat::StatU64;

                Self {
                    #( #fields_ident: StatU64::new(), )*
                }
            }

            fn snapshot(&self) -> Self::Snap {
                #ident_snap {
                    #( #fields_ident: self.#fields_ident.val(), )*
                }
            }
        }
    };

    output.into()
}
