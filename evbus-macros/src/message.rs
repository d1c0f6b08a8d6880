use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{DeriveInput, Expr, ExprAssign, Lit, LitStr, Result as SynResult, Token};

// 解析 #[message(...)] 键值参数：topic = "<str>"、channel = "<str>"
#[derive(Default)]
struct MessageAttrConfig {
    topic: Option<LitStr>,
    channel: Option<LitStr>,
}

impl MessageAttrConfig {
    fn from_attrs(attrs: &[syn::Attribute]) -> SynResult<Self> {
        let mut cfg = Self::default();

        for attr in attrs.iter().filter(|a| a.path().is_ident("message")) {
            let pairs =
                attr.parse_args_with(Punctuated::<ExprAssign, Token![,]>::parse_terminated)?;

            for assign in pairs.into_iter() {
                let key_ident = match *assign.left {
                    Expr::Path(p) if p.path.segments.len() == 1 => p.path.segments[0].ident.clone(),
                    other => {
                        return Err(syn::Error::new(other.span(), "invalid attribute key"));
                    }
                };
                let value = string_literal(&assign.right)?;

                let slot = match key_ident.to_string().as_str() {
                    "topic" => &mut cfg.topic,
                    "channel" => &mut cfg.channel,
                    _ => {
                        return Err(syn::Error::new(
                            key_ident.span(),
                            "unknown key; expected 'topic' | 'channel'",
                        ));
                    }
                };
                if slot.is_some() {
                    return Err(syn::Error::new(
                        key_ident.span(),
                        format!("duplicate key '{}' in attribute", key_ident),
                    ));
                }
                *slot = Some(value);
            }
        }

        Ok(cfg)
    }
}

fn string_literal(expr: &Expr) -> SynResult<LitStr> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) if s.value().trim().is_empty() => {
                Err(syn::Error::new(s.span(), "value must not be empty"))
            }
            Lit::Str(s) => Ok(s.clone()),
            other => Err(syn::Error::new(other.span(), "expected a string literal")),
        },
        other => Err(syn::Error::new(other.span(), "expected a string literal")),
    }
}

fn declared(value: Option<LitStr>) -> TokenStream2 {
    match value {
        Some(lit) => quote! { ::core::option::Option::Some(#lit) },
        None => quote! { ::core::option::Option::None },
    }
}

pub(crate) fn expand(input: DeriveInput) -> SynResult<TokenStream2> {
    if let syn::Data::Union(u) = &input.data {
        return Err(syn::Error::new(
            u.union_token.span(),
            "#[derive(Message)] does not support unions",
        ));
    }

    let cfg = MessageAttrConfig::from_attrs(&input.attrs)?;
    let topic = declared(cfg.topic);
    let channel = declared(cfg.channel);

    let ident = &input.ident;
    let mut generics = input.generics.clone();
    // 消息需跨线程投递，泛型参数一并约束
    for param in generics.type_params_mut() {
        param.bounds.push(syn::parse_quote!(::core::marker::Send));
        param.bounds.push(syn::parse_quote!(::core::marker::Sync));
        param.bounds.push(syn::parse_quote!('static));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::evbus_core::message::Message for #ident #ty_generics #where_clause {
            const TOPIC: ::core::option::Option<&'static str> = #topic;
            const CHANNEL: ::core::option::Option<&'static str> = #channel;
        }
    })
}
