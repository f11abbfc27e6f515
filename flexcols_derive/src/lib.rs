use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use std::collections::{BTreeMap, BTreeSet};
use syn::{Data, DeriveInput, Fields, Ident, LitStr, parse_macro_input, spanned::Spanned};

/// Generates flex column accessors and an `impl FlexOwner`.
///
/// Column, field, prefix and derived method names must be ASCII identifiers,
/// the same rule the runtime schema applies:
///
/// ```compile_fail
/// use flexcols::{FlexColumn, FlexColumns};
///
/// #[derive(Default, FlexColumns)]
/// struct Cafe {
///     #[flex_column(fields(thé, coffee))]
///     attrs: FlexColumn,
/// }
/// ```
///
/// ```compile_fail
/// use flexcols::{FlexColumn, FlexColumns};
///
/// #[derive(Default, FlexColumns)]
/// struct Cafe {
///     #[flex_column(fields(coffee), prefix = "café")]
///     attrs: FlexColumn,
/// }
/// ```
#[proc_macro_derive(FlexColumns, attributes(flex_column, flex_columns))]
pub fn derive_flex_columns(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_flex_columns(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_flex_columns(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            input.generics,
            "FlexColumns does not support generic structs",
        ));
    }

    let owner_options = parse_flex_columns_options(&input.attrs)?;

    let data_struct = match input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "FlexColumns can only be derived for structs",
            ));
        }
    };

    let named_fields = match data_struct.fields {
        Fields::Named(fields) => fields,
        _ => {
            return Err(syn::Error::new(
                struct_name.span(),
                "FlexColumns requires named fields",
            ));
        }
    };

    let mut columns = Vec::<ColumnOptions>::new();
    let mut plain_fields = Vec::<Ident>::new();
    for field in named_fields.named {
        let ident = field
            .ident
            .clone()
            .ok_or_else(|| syn::Error::new(field.span(), "FlexColumns requires named fields"))?;
        match parse_flex_column_options(&ident, &field.attrs)? {
            Some(options) => columns.push(options),
            None => plain_fields.push(ident),
        }
    }

    if columns.is_empty() {
        return Err(syn::Error::new(
            struct_name.span(),
            "FlexColumns requires at least one #[flex_column(...)] field",
        ));
    }

    let mut reserved = BTreeSet::<String>::new();
    for ident in &plain_fields {
        let name = ident_name(ident);
        reserved.insert(format!("set_{}", name));
        reserved.insert(name);
    }
    for column in &columns {
        let name = ident_name(&column.ident);
        reserved.insert(format!("set_{}", name));
        reserved.insert(format!("{}_mut", name));
        reserved.insert(name);
    }
    for ident in &owner_options.reserved {
        reserved.insert(ident_name(ident));
    }

    let mut accessors = Vec::<ResolvedAccessor>::new();
    let mut claimed = BTreeMap::<String, (String, String)>::new();
    for column in &columns {
        for accessor in resolve_accessors(column, &reserved)? {
            let column_name = ident_name(&column.ident);
            for name in [&accessor.getter, &accessor.setter] {
                if let Some((other_column, other_field)) = claimed.get(&name.to_string()) {
                    return Err(syn::Error::new(
                        accessor.span,
                        format!(
                            "accessor `{}` collides with the accessor for field `{}` of flex column `{}`",
                            name, other_field, other_column
                        ),
                    ));
                }
            }
            claimed.insert(
                accessor.getter.to_string(),
                (column_name.clone(), accessor.field.clone()),
            );
            claimed.insert(
                accessor.setter.to_string(),
                (column_name.clone(), accessor.field.clone()),
            );
            accessors.push(accessor);
        }
    }

    let type_name = struct_name.to_string();
    let reserved_names = reserved.iter();
    let definitions = columns.iter().map(column_definition_tokens);

    let column_methods = columns.iter().map(|column| {
        let ident = &column.ident;
        let name = ident_name(ident);
        let mut_ident = format_ident!("{}_mut", name);
        quote! {
            pub fn #ident(&self) -> ::flexcols::Result<&::flexcols::FieldContainer> {
                ::flexcols::FlexOwner::flex(self, #name)
            }

            pub fn #mut_ident(&mut self) -> ::flexcols::Result<&mut ::flexcols::FieldContainer> {
                ::flexcols::FlexOwner::flex_mut(self, #name)
            }
        }
    });

    let accessor_methods = accessors.iter().map(|accessor| {
        let getter = &accessor.getter;
        let setter = &accessor.setter;
        let column = &accessor.column;
        let field = &accessor.field;
        let vis = if accessor.public { quote!(pub) } else { quote!() };
        quote! {
            #[allow(dead_code)]
            #vis fn #getter(&self) -> ::flexcols::Result<::std::option::Option<::flexcols::Value>> {
                ::flexcols::FlexOwner::read_field(self, #column, #field)
            }

            #[allow(dead_code)]
            #vis fn #setter(
                &mut self,
                value: impl ::std::convert::Into<::flexcols::Value>,
            ) -> ::flexcols::Result<::flexcols::Value> {
                ::flexcols::FlexOwner::write_field(self, #column, #field, value.into())
            }
        }
    });

    let slot_arms = columns.iter().map(|column| {
        let ident = &column.ident;
        let name = ident_name(ident);
        quote!(#name => ::std::result::Result::Ok(&self.#ident),)
    });
    let slot_mut_arms = columns.iter().map(|column| {
        let ident = &column.ident;
        let name = ident_name(ident);
        quote!(#name => ::std::result::Result::Ok(&mut self.#ident),)
    });

    Ok(quote! {
        impl #struct_name {
            #[doc(hidden)]
            pub fn __flexcols_schema() -> &'static ::flexcols::FlexSchema {
                static SCHEMA: ::std::sync::OnceLock<::flexcols::FlexSchema> =
                    ::std::sync::OnceLock::new();
                SCHEMA.get_or_init(|| {
                    ::flexcols::FlexSchema::builder(#type_name)
                        #( .reserve(#reserved_names) )*
                        #( .flex_column(#definitions) )*
                        .build()
                        .expect("flex columns are validated when #[derive(FlexColumns)] expands")
                })
            }

            #( #column_methods )*

            #( #accessor_methods )*
        }

        impl ::flexcols::FlexOwner for #struct_name {
            fn flex_schema(&self) -> &::flexcols::FlexSchema {
                Self::__flexcols_schema()
            }

            fn flex_slot(&self, column: &str) -> ::flexcols::Result<&::flexcols::FlexColumn> {
                match column {
                    #( #slot_arms )*
                    _ => ::std::result::Result::Err(::flexcols::FlexError::UnknownColumn {
                        owner: #type_name.to_string(),
                        column: column.to_string(),
                    }),
                }
            }

            fn flex_slot_mut(
                &mut self,
                column: &str,
            ) -> ::flexcols::Result<&mut ::flexcols::FlexColumn> {
                match column {
                    #( #slot_mut_arms )*
                    _ => ::std::result::Result::Err(::flexcols::FlexError::UnknownColumn {
                        owner: #type_name.to_string(),
                        column: column.to_string(),
                    }),
                }
            }
        }
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Delegate {
    Public,
    Private,
    Off,
}

struct FieldOptions {
    ident: Ident,
    stored_as: Option<LitStr>,
}

struct ColumnOptions {
    ident: Ident,
    fields: Vec<FieldOptions>,
    delegate: Delegate,
    prefix: Option<LitStr>,
    delete_unknown: bool,
    reject_collisions: bool,
    length_limit: Option<usize>,
    derived: Vec<(Ident, syn::Path)>,
}

#[derive(Default)]
struct FlexColumnsOptions {
    reserved: Vec<Ident>,
}

struct ResolvedAccessor {
    column: String,
    field: String,
    getter: Ident,
    setter: Ident,
    public: bool,
    span: Span,
}

fn ident_name(ident: &Ident) -> String {
    ident.to_string().trim_start_matches("r#").to_string()
}

/// Same policy as `DelegationResolver`, applied while expanding so that
/// collisions are compile errors.
fn resolve_accessors(
    column: &ColumnOptions,
    reserved: &BTreeSet<String>,
) -> syn::Result<Vec<ResolvedAccessor>> {
    let public = match column.delegate {
        Delegate::Off => return Ok(Vec::new()),
        Delegate::Public => true,
        Delegate::Private => false,
    };

    let prefix = column.prefix.as_ref().map(LitStr::value);
    let mut accessors = Vec::new();
    for field in &column.fields {
        let field_name = ident_name(&field.ident);
        let name = match &prefix {
            Some(prefix) => format!("{}_{}", prefix, field_name),
            None => field_name.clone(),
        };
        let setter = format!("set_{}", name);

        if let Some(member) = [&name, &setter]
            .into_iter()
            .find(|candidate| reserved.contains(*candidate))
        {
            if column.reject_collisions {
                return Err(syn::Error::new(
                    field.ident.span(),
                    format!(
                        "accessor `{}` of flex column `{}` collides with owner member `{}`",
                        name,
                        ident_name(&column.ident),
                        member
                    ),
                ));
            }
            continue;
        }

        if let Some(other) = accessors
            .iter()
            .find(|accessor: &&ResolvedAccessor| accessor.getter == setter || accessor.setter == name)
        {
            return Err(syn::Error::new(
                field.ident.span(),
                format!(
                    "accessor `{}` collides with the accessor for field `{}`",
                    name, other.field
                ),
            ));
        }

        accessors.push(ResolvedAccessor {
            column: ident_name(&column.ident),
            field: field_name,
            getter: Ident::new(&name, field.ident.span()),
            setter: Ident::new(&setter, field.ident.span()),
            public,
            span: field.ident.span(),
        });
    }

    Ok(accessors)
}

fn column_definition_tokens(column: &ColumnOptions) -> TokenStream2 {
    let column_name = ident_name(&column.ident);
    let fields = column.fields.iter().map(|field| {
        let name = ident_name(&field.ident);
        match &field.stored_as {
            Some(key) => quote! {
                ::flexcols::FieldDefinition::new(#name).stored_as(#key)
            },
            None => quote! {
                ::flexcols::FieldDefinition::new(#name)
            },
        }
    });
    let delegate = match column.delegate {
        Delegate::Public => quote!(::flexcols::DelegateMode::Public),
        Delegate::Private => quote!(::flexcols::DelegateMode::Private),
        Delegate::Off => quote!(::flexcols::DelegateMode::Off),
    };
    let unknown_fields = if column.delete_unknown {
        quote!(::flexcols::UnknownFieldPolicy::Delete)
    } else {
        quote!(::flexcols::UnknownFieldPolicy::Preserve)
    };
    let collisions = if column.reject_collisions {
        quote!(::flexcols::CollisionPolicy::Reject)
    } else {
        quote!(::flexcols::CollisionPolicy::Shadow)
    };
    let prefix = column
        .prefix
        .as_ref()
        .map(|prefix| quote!(.prefix(#prefix)));
    let length_limit = column
        .length_limit
        .map(|limit| quote!(.length_limit(#limit)));
    let derived = column.derived.iter().map(|(name, path)| {
        let name = ident_name(name);
        quote!(.derived(#name, #path))
    });

    quote! {
        ::flexcols::FlexColumnDefinition::new(#column_name)
            #( .field_definition(#fields) )*
            .delegate(#delegate)
            .unknown_fields(#unknown_fields)
            .collisions(#collisions)
            #prefix
            #length_limit
            #( #derived )*
    }
}

fn parse_flex_column_options(
    ident: &Ident,
    attrs: &[syn::Attribute],
) -> syn::Result<Option<ColumnOptions>> {
    let mut options: Option<ColumnOptions> = None;

    for attr in attrs {
        if !attr.path().is_ident("flex_column") {
            continue;
        }

        if options.is_some() {
            return Err(syn::Error::new(
                attr.span(),
                "Duplicate #[flex_column(...)] attribute on field",
            ));
        }

        let mut parsed = ColumnOptions {
            ident: ident.clone(),
            fields: Vec::new(),
            delegate: Delegate::Public,
            prefix: None,
            delete_unknown: false,
            reject_collisions: false,
            length_limit: None,
            derived: Vec::new(),
        };
        let mut stored_as = Vec::<(Ident, LitStr)>::new();

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("fields") {
                return meta.parse_nested_meta(|inner| {
                    let field = inner
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| inner.error("expected a field name"))?;
                    parsed.fields.push(FieldOptions {
                        ident: field,
                        stored_as: None,
                    });
                    Ok(())
                });
            }

            if meta.path.is_ident("delegate") {
                let value = meta.value()?;
                let lit: syn::Lit = value.parse()?;
                parsed.delegate = match &lit {
                    syn::Lit::Bool(flag) if flag.value => Delegate::Public,
                    syn::Lit::Bool(_) => Delegate::Off,
                    syn::Lit::Str(mode) => match mode.value().as_str() {
                        "public" => Delegate::Public,
                        "private" => Delegate::Private,
                        "off" => Delegate::Off,
                        _ => {
                            return Err(syn::Error::new(
                                mode.span(),
                                "delegate must be \"public\", \"private\", \"off\", true or false",
                            ));
                        }
                    },
                    other => {
                        return Err(syn::Error::new(
                            other.span(),
                            "delegate must be a string or a boolean",
                        ));
                    }
                };
                return Ok(());
            }

            if meta.path.is_ident("prefix") {
                let lit: LitStr = meta.value()?.parse()?;
                require_plain_identifier("prefix", &lit.value(), lit.span())?;
                parsed.prefix = Some(lit);
                return Ok(());
            }

            if meta.path.is_ident("unknown_fields") {
                let lit: LitStr = meta.value()?.parse()?;
                parsed.delete_unknown = match lit.value().as_str() {
                    "preserve" => false,
                    "delete" => true,
                    _ => {
                        return Err(syn::Error::new(
                            lit.span(),
                            "unknown_fields must be \"preserve\" or \"delete\"",
                        ));
                    }
                };
                return Ok(());
            }

            if meta.path.is_ident("collisions") {
                let lit: LitStr = meta.value()?.parse()?;
                parsed.reject_collisions = match lit.value().as_str() {
                    "shadow" => false,
                    "reject" => true,
                    _ => {
                        return Err(syn::Error::new(
                            lit.span(),
                            "collisions must be \"shadow\" or \"reject\"",
                        ));
                    }
                };
                return Ok(());
            }

            if meta.path.is_ident("length_limit") {
                let lit: syn::LitInt = meta.value()?.parse()?;
                parsed.length_limit = Some(lit.base10_parse::<usize>()?);
                return Ok(());
            }

            if meta.path.is_ident("stored_as") {
                return meta.parse_nested_meta(|inner| {
                    let field = inner
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| inner.error("expected a field name"))?;
                    let key: LitStr = inner.value()?.parse()?;
                    stored_as.push((field, key));
                    Ok(())
                });
            }

            if meta.path.is_ident("derived") {
                return meta.parse_nested_meta(|inner| {
                    let name = inner
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| inner.error("expected a method name"))?;
                    let handler: syn::Path = inner.value()?.parse()?;
                    parsed.derived.push((name, handler));
                    Ok(())
                });
            }

            Err(meta.error(
                "Unsupported flex_column option. Supported: fields(...), delegate = ..., prefix = \"...\", unknown_fields = \"...\", collisions = \"...\", length_limit = <usize>, stored_as(field = \"...\"), derived(name = path)",
            ))
        })?;

        for (field, key) in stored_as {
            let Some(target) = parsed.fields.iter_mut().find(|candidate| candidate.ident == field)
            else {
                return Err(syn::Error::new(
                    field.span(),
                    format!("stored_as names `{}`, which is not in fields(...)", field),
                ));
            };
            if key.value().is_empty() {
                return Err(syn::Error::new(key.span(), "storage key cannot be empty"));
            }
            target.stored_as = Some(key);
        }

        validate_column(&parsed)?;
        options = Some(parsed);
    }

    Ok(options)
}

/// Names the runtime schema accepts: `[A-Za-z_][A-Za-z0-9_]*`.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|rest| rest.is_ascii_alphanumeric() || rest == '_')
}

fn require_plain_identifier(kind: &str, name: &str, span: Span) -> syn::Result<()> {
    if is_plain_identifier(name) {
        return Ok(());
    }
    Err(syn::Error::new(
        span,
        format!(
            "{} `{}` must match [A-Za-z_][A-Za-z0-9_]* to be stored in a flex column",
            kind, name
        ),
    ))
}

fn validate_column(column: &ColumnOptions) -> syn::Result<()> {
    let column_name = ident_name(&column.ident);
    require_plain_identifier("column", &column_name, column.ident.span())?;
    let mut names = BTreeSet::new();
    let mut keys = BTreeSet::new();
    for field in &column.fields {
        let name = ident_name(&field.ident);
        require_plain_identifier("field", &name, field.ident.span())?;
        if !names.insert(name.clone()) {
            return Err(syn::Error::new(
                field.ident.span(),
                format!(
                    "field `{}` is declared more than once in flex column `{}`",
                    name, column_name
                ),
            ));
        }
        let key = field
            .stored_as
            .as_ref()
            .map(LitStr::value)
            .unwrap_or_else(|| name.clone());
        if !keys.insert(key.clone()) {
            return Err(syn::Error::new(
                field.ident.span(),
                format!(
                    "storage key `{}` is used more than once in flex column `{}`",
                    key, column_name
                ),
            ));
        }
    }

    for (name, _) in &column.derived {
        require_plain_identifier("derived method", &ident_name(name), name.span())?;
        if !names.insert(ident_name(name)) {
            return Err(syn::Error::new(
                name.span(),
                format!(
                    "derived method `{}` reuses a name already declared in flex column `{}`",
                    name, column_name
                ),
            ));
        }
    }

    Ok(())
}

fn parse_flex_columns_options(attrs: &[syn::Attribute]) -> syn::Result<FlexColumnsOptions> {
    let mut options = FlexColumnsOptions::default();

    for attr in attrs {
        if !attr.path().is_ident("flex_columns") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("reserve") {
                return meta.parse_nested_meta(|inner| {
                    let name = inner
                        .path
                        .get_ident()
                        .cloned()
                        .ok_or_else(|| inner.error("expected a method name"))?;
                    options.reserved.push(name);
                    Ok(())
                });
            }

            Err(meta.error("Unsupported flex_columns attribute. Supported: reserve(name, ...)"))
        })?;
    }

    Ok(options)
}
