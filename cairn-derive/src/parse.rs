//! Attribute parsing for the Describe derive macro.
//!
//! Reads `#[config(...)]` and the subset of `#[serde(...)]` that changes the
//! shape serde expects, so the descriptor and the `Deserialize` impl agree.

use syn::{
    meta::ParseNestedMeta, spanned::Spanned, Attribute, Error, Expr, LitStr, Result, Token,
};

/// serde's `rename_all` rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameRule {
    Lower,
    Upper,
    Pascal,
    Camel,
    Snake,
    ScreamingSnake,
    Kebab,
    ScreamingKebab,
}

impl RenameRule {
    fn parse(lit: &LitStr) -> Result<Self> {
        Ok(match lit.value().as_str() {
            "lowercase" => RenameRule::Lower,
            "UPPERCASE" => RenameRule::Upper,
            "PascalCase" => RenameRule::Pascal,
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "SCREAMING_SNAKE_CASE" => RenameRule::ScreamingSnake,
            "kebab-case" => RenameRule::Kebab,
            "SCREAMING-KEBAB-CASE" => RenameRule::ScreamingKebab,
            other => {
                return Err(Error::new(
                    lit.span(),
                    format!("unknown rename rule '{}'", other),
                ))
            }
        })
    }

    /// Apply to a field name (snake_case in source).
    pub fn apply_to_field(self, name: &str) -> String {
        match self {
            RenameRule::Lower | RenameRule::Snake => name.to_string(),
            RenameRule::Upper | RenameRule::ScreamingSnake => name.to_ascii_uppercase(),
            RenameRule::Pascal => pascal(name),
            RenameRule::Camel => {
                let pascal = pascal(name);
                lower_first(&pascal)
            }
            RenameRule::Kebab => name.replace('_', "-"),
            RenameRule::ScreamingKebab => name.replace('_', "-").to_ascii_uppercase(),
        }
    }

    /// Apply to a variant name (PascalCase in source).
    pub fn apply_to_variant(self, name: &str) -> String {
        match self {
            RenameRule::Pascal => name.to_string(),
            RenameRule::Lower => name.to_ascii_lowercase(),
            RenameRule::Upper => name.to_ascii_uppercase(),
            RenameRule::Camel => lower_first(name),
            RenameRule::Snake => snake(name),
            RenameRule::ScreamingSnake => snake(name).to_ascii_uppercase(),
            RenameRule::Kebab => snake(name).replace('_', "-"),
            RenameRule::ScreamingKebab => snake(name).replace('_', "-").to_ascii_uppercase(),
        }
    }
}

fn pascal(snake: &str) -> String {
    snake
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn snake(pascal: &str) -> String {
    let mut out = String::new();
    for (i, c) in pascal.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Attributes on the struct or enum itself.
#[derive(Debug, Default)]
pub struct ContainerAttrs {
    pub rename: Option<String>,
    pub rename_all: Option<RenameRule>,
    /// `#[serde(default)]` on the container: every field has a default.
    pub default: bool,
    pub discriminator: Option<String>,
    pub transparent: bool,
}

/// Attributes on a field.
#[derive(Debug, Default)]
pub struct FieldAttrs {
    pub rename: Option<String>,
    pub aliases: Vec<String>,
    pub default: bool,
    pub skip: bool,
    pub secret: bool,
}

/// Attributes on an enum variant.
#[derive(Debug, Default)]
pub struct VariantAttrs {
    pub rename: Option<String>,
    pub skip: bool,
}

fn string_value(meta: &ParseNestedMeta<'_>) -> Result<String> {
    let lit: LitStr = meta.value()?.parse()?;
    Ok(lit.value())
}

/// Consume whatever follows a serde key we do not interpret.
fn skip_value(meta: &ParseNestedMeta<'_>) -> Result<()> {
    if meta.input.peek(Token![=]) {
        let _: Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        meta.parse_nested_meta(|nested| skip_value(&nested))?;
    }
    Ok(())
}

pub fn container_attrs(attrs: &[Attribute]) -> Result<ContainerAttrs> {
    let mut out = ContainerAttrs::default();
    for attr in attrs {
        if attr.path().is_ident("config") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("discriminator") {
                    out.discriminator = Some(string_value(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("expected `discriminator = \"...\"`"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    if meta.input.peek(Token![=]) {
                        out.rename = Some(string_value(&meta)?);
                    } else {
                        skip_value(&meta)?;
                    }
                } else if meta.path.is_ident("rename_all") {
                    if meta.input.peek(Token![=]) {
                        let lit: LitStr = meta.value()?.parse()?;
                        out.rename_all = Some(RenameRule::parse(&lit)?);
                    } else {
                        skip_value(&meta)?;
                    }
                } else if meta.path.is_ident("default") {
                    out.default = true;
                    skip_value(&meta)?;
                } else if meta.path.is_ident("transparent") {
                    out.transparent = true;
                } else if meta.path.is_ident("tag")
                    || meta.path.is_ident("content")
                    || meta.path.is_ident("untagged")
                {
                    return Err(meta.error(
                        "only externally tagged enums are supported; use #[config(discriminator = \"...\")] to select variants by key",
                    ));
                } else {
                    skip_value(&meta)?;
                }
                Ok(())
            })?;
        }
    }
    Ok(out)
}

pub fn field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs {
        if attr.path().is_ident("config") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("alias") {
                    out.aliases.push(string_value(&meta)?);
                    Ok(())
                } else if meta.path.is_ident("secret") {
                    out.secret = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `alias = \"...\"` or `secret`"))
                }
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                    out.rename = Some(string_value(&meta)?);
                } else if meta.path.is_ident("alias") {
                    out.aliases.push(string_value(&meta)?);
                } else if meta.path.is_ident("default") {
                    out.default = true;
                    skip_value(&meta)?;
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    out.skip = true;
                } else if meta.path.is_ident("flatten") {
                    return Err(Error::new(
                        attr.span(),
                        "#[serde(flatten)] is not supported by #[derive(Describe)]",
                    ));
                } else {
                    skip_value(&meta)?;
                }
                Ok(())
            })?;
        }
    }
    Ok(out)
}

pub fn variant_attrs(attrs: &[Attribute]) -> Result<VariantAttrs> {
    let mut out = VariantAttrs::default();
    for attr in attrs {
        if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                    out.rename = Some(string_value(&meta)?);
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    out.skip = true;
                } else {
                    skip_value(&meta)?;
                }
                Ok(())
            })?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_rename_rules() {
        assert_eq!(RenameRule::Camel.apply_to_field("max_pool_size"), "maxPoolSize");
        assert_eq!(RenameRule::Kebab.apply_to_field("max_pool_size"), "max-pool-size");
        assert_eq!(RenameRule::ScreamingSnake.apply_to_field("max_pool"), "MAX_POOL");
        assert_eq!(RenameRule::Snake.apply_to_variant("RoundRobin"), "round_robin");
        assert_eq!(RenameRule::Kebab.apply_to_variant("RoundRobin"), "round-robin");
        assert_eq!(RenameRule::Lower.apply_to_variant("RoundRobin"), "roundrobin");
    }

    #[test]
    fn test_field_attrs() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[config(alias = "pwd", secret)]),
            parse_quote!(#[serde(rename = "pass", default = "default_pass", deserialize_with = "x")]),
        ];
        let parsed = field_attrs(&attrs).unwrap();
        assert_eq!(parsed.rename.as_deref(), Some("pass"));
        assert_eq!(parsed.aliases, vec!["pwd"]);
        assert!(parsed.default);
        assert!(parsed.secret);
        assert!(!parsed.skip);
    }

    #[test]
    fn test_container_attrs() {
        let attrs: Vec<Attribute> = vec![
            parse_quote!(#[serde(rename_all = "kebab-case", default)]),
            parse_quote!(#[config(discriminator = "type")]),
        ];
        let parsed = container_attrs(&attrs).unwrap();
        assert_eq!(parsed.rename_all, Some(RenameRule::Kebab));
        assert!(parsed.default);
        assert_eq!(parsed.discriminator.as_deref(), Some("type"));
    }

    #[test]
    fn test_internally_tagged_is_rejected() {
        let attrs: Vec<Attribute> = vec![parse_quote!(#[serde(tag = "kind")])];
        assert!(container_attrs(&attrs).is_err());
    }
}
