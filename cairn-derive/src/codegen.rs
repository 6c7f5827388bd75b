//! Code generation for the Describe derive macro.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    parse_quote, spanned::Spanned, Data, DataEnum, DeriveInput, Error, Fields, FieldsNamed,
    Generics, Result,
};

use crate::parse::{container_attrs, field_attrs, variant_attrs, ContainerAttrs};

pub fn derive_describe(input: DeriveInput) -> Result<TokenStream> {
    let attrs = container_attrs(&input.attrs)?;
    let name = &input.ident;
    let type_name = attrs.rename.clone().unwrap_or_else(|| name.to_string());

    let body = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) if !attrs.transparent => {
                let record = record_desc(&type_name, fields, &attrs)?;
                quote! { ::cairn::describe::TypeDesc::Record(#record) }
            }
            Fields::Named(fields) if fields.named.len() == 1 => {
                let ty = &fields.named[0].ty;
                quote! { <#ty as ::cairn::describe::Describe>::describe() }
            }
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                let ty = &fields.unnamed[0].ty;
                quote! { <#ty as ::cairn::describe::Describe>::describe() }
            }
            _ => {
                return Err(Error::new(
                    input.span(),
                    "#[derive(Describe)] supports structs with named fields and single-field newtypes",
                ))
            }
        },
        Data::Enum(data) => enum_desc(&type_name, data, &attrs)?,
        Data::Union(_) => return Err(Error::new(input.span(), "unions cannot be described")),
    };

    let generics = with_describe_bounds(&input.generics);
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::cairn::describe::Describe for #name #ty_generics #where_clause {
            fn describe() -> ::cairn::describe::TypeDesc {
                #body
            }
        }
    })
}

fn with_describe_bounds(generics: &Generics) -> Generics {
    let mut generics = generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(::cairn::describe::Describe));
    }
    generics
}

/// A `RecordDesc` expression for named fields.
fn record_desc(type_name: &str, fields: &FieldsNamed, container: &ContainerAttrs) -> Result<TokenStream> {
    let mut chain = Vec::new();
    for field in &fields.named {
        let attrs = field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let rust_name = ident.to_string();
        let rust_name = rust_name.strip_prefix("r#").unwrap_or(&rust_name).to_string();
        let key = match (&attrs.rename, container.rename_all) {
            (Some(rename), _) => rename.clone(),
            (None, Some(rule)) => rule.apply_to_field(&rust_name),
            (None, None) => rust_name.clone(),
        };
        let ty = &field.ty;

        let mut desc = quote! {
            ::cairn::describe::FieldDesc::new(#rust_name, <#ty as ::cairn::describe::Describe>::describe())
                .key(#key)
        };
        for alias in &attrs.aliases {
            desc = quote! { #desc.alias(#alias) };
        }
        if attrs.default || container.default {
            desc = quote! { #desc.with_default() };
        }
        if attrs.secret {
            desc = quote! { #desc.secret() };
        }
        chain.push(quote! { .field(#desc) });
    }

    Ok(quote! {
        ::cairn::describe::RecordDesc::new(#type_name) #(#chain)*
    })
}

fn enum_desc(type_name: &str, data: &DataEnum, container: &ContainerAttrs) -> Result<TokenStream> {
    let mut variants = Vec::new();
    let mut all_unit = true;

    for variant in &data.variants {
        let attrs = variant_attrs(&variant.attrs)?;
        if attrs.skip {
            continue;
        }
        let rust_name = variant.ident.to_string();
        let name = match (&attrs.rename, container.rename_all) {
            (Some(rename), _) => rename.clone(),
            (None, Some(rule)) => rule.apply_to_variant(&rust_name),
            (None, None) => rust_name.clone(),
        };

        let shape = match &variant.fields {
            Fields::Unit => quote! { ::cairn::describe::VariantShape::Unit },
            Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                all_unit = false;
                let ty = &fields.unnamed[0].ty;
                quote! {
                    ::cairn::describe::VariantShape::Newtype(::std::boxed::Box::new(
                        <#ty as ::cairn::describe::Describe>::describe(),
                    ))
                }
            }
            Fields::Named(fields) => {
                all_unit = false;
                let variant_attrs = ContainerAttrs::default();
                let record = record_desc(&rust_name, fields, &variant_attrs)?;
                quote! { ::cairn::describe::VariantShape::Struct(#record) }
            }
            Fields::Unnamed(_) => {
                return Err(Error::new(
                    variant.span(),
                    "tuple variants with more than one field are not supported",
                ))
            }
        };
        variants.push((name, shape));
    }

    if all_unit && container.discriminator.is_none() {
        let names = variants.iter().map(|(name, _)| name);
        return Ok(quote! {
            ::cairn::describe::TypeDesc::Enum {
                name: ::std::string::String::from(#type_name),
                variants: ::std::vec![#(::std::string::String::from(#names)),*],
            }
        });
    }

    let discriminator = match &container.discriminator {
        Some(key) => quote! { ::std::option::Option::Some(::std::string::String::from(#key)) },
        None => quote! { ::std::option::Option::None },
    };
    let variants = variants.iter().map(|(name, shape)| {
        quote! {
            ::cairn::describe::VariantDesc {
                name: ::std::string::String::from(#name),
                shape: #shape,
            }
        }
    });
    Ok(quote! {
        ::cairn::describe::TypeDesc::Sum(::cairn::describe::SumDesc {
            name: ::std::string::String::from(#type_name),
            discriminator: #discriminator,
            variants: ::std::vec![#(#variants),*],
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(input: DeriveInput) -> String {
        derive_describe(input).unwrap().to_string()
    }

    #[test]
    fn test_struct_fields_carry_serde_keys() {
        let out = expand(parse_quote! {
            #[serde(rename_all = "camelCase")]
            struct Database {
                max_pool: u32,
                #[serde(default)]
                #[config(alias = "pwd", secret)]
                password: String,
                #[serde(skip)]
                cache: (),
            }
        });
        assert!(out.contains("\"maxPool\""));
        assert!(out.contains("\"max_pool\""));
        assert!(out.contains("with_default"));
        assert!(out.contains("alias (\"pwd\")"));
        assert!(out.contains("secret ()"));
        assert!(!out.contains("cache"));
    }

    #[test]
    fn test_unit_enum_is_enum() {
        let out = expand(parse_quote! {
            #[serde(rename_all = "lowercase")]
            enum Level { Debug, Info }
        });
        assert!(out.contains("TypeDesc :: Enum"));
        assert!(out.contains("\"debug\""));
    }

    #[test]
    fn test_data_enum_is_sum() {
        let out = expand(parse_quote! {
            #[config(discriminator = "type")]
            enum Store { Memory, Redis { url: String }, Custom(Box<Plugin>) }
        });
        assert!(out.contains("TypeDesc :: Sum"));
        assert!(out.contains("\"type\""));
        assert!(out.contains("VariantShape :: Newtype"));
        assert!(out.contains("VariantShape :: Struct"));
    }

    #[test]
    fn test_generic_params_get_bounds() {
        let out = expand(parse_quote! {
            struct Wrapper<T> { inner: T }
        });
        assert!(out.contains(":: cairn :: describe :: Describe for Wrapper < T >"));
    }

    #[test]
    fn test_tuple_struct_is_rejected() {
        let input: DeriveInput = parse_quote! { struct Pair(u8, u8); };
        assert!(derive_describe(input).is_err());
    }
}
