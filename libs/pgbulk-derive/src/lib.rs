use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields, LitInt, LitStr, Type};

/// Derive macro for bulk-load record mapping.
///
/// Emits an implementation of `pgbulk::mapping::BulkRecord` carrying the
/// per-field column metadata in declaration order. Semantic validation
/// (ambiguity, identifier part resolution, wire-type compatibility) happens
/// in the library at first use of the type, so those errors name the field
/// at the call site rather than at expansion time.
///
/// # Field attributes
///
/// ```ignore
/// #[derive(BulkRecord)]
/// struct Quote {
///     #[bulk(column = "Id", kind = "int4")]
///     id: i32,
///
///     #[bulk(column = "Label", kind = "varchar", length = 64)]
///     label: Option<String>,
///
///     #[bulk(column = "ShardId", kind = "int2")]
///     #[bulk(column = "RecordId", kind = "int4")]
///     #[bulk(entity(shard = "ShardId", record = "RecordId"))]
///     owner: EntityId,
///
///     #[bulk(column = "State", kind = "int4", enumeration)]
///     state: QuoteState,
///
///     #[bulk(nested)]
///     audit: Audit,
///
///     ignored: u32,
/// }
/// ```
///
/// Supported field types: `bool`, `i16`, `i32`, `i64`, `f32`, `f64`,
/// `String`, `Vec<u8>`, `Uuid`, `NaiveDateTime`, `DateTime<Utc>`,
/// `NaiveDate`, `EntityId`, enums implementing `BulkEnum` (with the
/// `enumeration` flag), other `BulkRecord` types (with `nested`), and
/// `Option<..>` of any of the scalar ones.
#[proc_macro_derive(BulkRecord, attributes(bulk))]
pub fn derive_bulk_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match record_impl(&input) {
        Ok(tokens) => tokens,
        Err(e) => e.to_compile_error().into(),
    }
}

/// Derive macro for enum wire rendering.
///
/// Fieldless enums only. The ordinal follows explicit integer discriminants
/// when present, otherwise the variant position; the name is the variant
/// identifier.
#[proc_macro_derive(BulkEnum)]
pub fn derive_bulk_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match enum_impl(&input) {
        Ok(tokens) => tokens,
        Err(e) => e.to_compile_error().into(),
    }
}

/// One parsed `#[bulk(column = ..)]` annotation.
struct ColumnAttr {
    column: String,
    kind: String,
    length: Option<u32>,
    enumeration: bool,
}

/// Parsed `#[bulk(entity(..))]` annotation.
struct EntityAttr {
    shard: String,
    record: String,
    child: Option<String>,
    grandchild: Option<String>,
}

fn record_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;
    let name_str = name.to_string();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "BulkRecord only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "BulkRecord only supports structs",
            ))
        }
    };

    let mut spec_tokens = Vec::new();

    for field in fields {
        let field_ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let field_str = field_ident.to_string();

        let mut columns: Vec<ColumnAttr> = Vec::new();
        let mut entity: Option<EntityAttr> = None;
        let mut nested = false;

        for attr in &field.attrs {
            if !attr.path().is_ident("bulk") {
                continue;
            }

            let mut column: Option<String> = None;
            let mut kind: Option<String> = None;
            let mut length: Option<u32> = None;
            let mut enumeration = false;

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("column") {
                    let value: LitStr = meta.value()?.parse()?;
                    column = Some(value.value());
                } else if meta.path.is_ident("kind") {
                    let value: LitStr = meta.value()?.parse()?;
                    kind = Some(value.value());
                } else if meta.path.is_ident("length") {
                    let value: LitInt = meta.value()?.parse()?;
                    length = Some(value.base10_parse()?);
                } else if meta.path.is_ident("enumeration") {
                    enumeration = true;
                } else if meta.path.is_ident("nested") {
                    nested = true;
                } else if meta.path.is_ident("entity") {
                    let mut shard: Option<String> = None;
                    let mut record: Option<String> = None;
                    let mut child: Option<String> = None;
                    let mut grandchild: Option<String> = None;
                    meta.parse_nested_meta(|part| {
                        let value: LitStr = part.value()?.parse()?;
                        if part.path.is_ident("shard") {
                            shard = Some(value.value());
                        } else if part.path.is_ident("record") {
                            record = Some(value.value());
                        } else if part.path.is_ident("child") {
                            child = Some(value.value());
                        } else if part.path.is_ident("grandchild") {
                            grandchild = Some(value.value());
                        } else {
                            return Err(part.error("expected shard / record / child / grandchild"));
                        }
                        Ok(())
                    })?;
                    entity = Some(EntityAttr {
                        shard: shard
                            .ok_or_else(|| meta.error("entity(..) requires shard = \"..\""))?,
                        record: record
                            .ok_or_else(|| meta.error("entity(..) requires record = \"..\""))?,
                        child,
                        grandchild,
                    });
                } else {
                    return Err(meta.error(
                        "expected column / kind / length / enumeration / entity / nested",
                    ));
                }
                Ok(())
            })?;

            match (column, kind) {
                (Some(column), Some(kind)) => columns.push(ColumnAttr {
                    column,
                    kind,
                    length,
                    enumeration,
                }),
                (Some(_), None) => {
                    return Err(syn::Error::new_spanned(
                        attr,
                        "column = \"..\" requires kind = \"..\"",
                    ))
                }
                (None, Some(_)) => {
                    return Err(syn::Error::new_spanned(
                        attr,
                        "kind = \"..\" requires column = \"..\"",
                    ))
                }
                (None, None) => {}
            }
        }

        if !nested && columns.is_empty() && entity.is_none() {
            continue; // unannotated field — ignored
        }

        if nested {
            if !columns.is_empty() || entity.is_some() {
                return Err(syn::Error::new_spanned(
                    field_ident,
                    "nested fields cannot carry column or entity mappings",
                ));
            }
            let ty = &field.ty;
            spec_tokens.push(quote! {
                pgbulk::mapping::FieldSpec::<Self>::nested::<#ty>(
                    #field_str,
                    |r: &Self| &r.#field_ident,
                )
            });
            continue;
        }

        let enumeration = columns.iter().any(|c| c.enumeration);
        let mapping_tokens: Vec<TokenStream2> = columns
            .iter()
            .map(|c| {
                let kind = kind_tokens(field, &c.kind, c.length)?;
                let column = &c.column;
                Ok(quote! {
                    pgbulk::mapping::ScalarMapping { column: #column, kind: #kind }
                })
            })
            .collect::<Result<_, syn::Error>>()?;

        let composite_tokens = match &entity {
            Some(e) => {
                let shard = &e.shard;
                let record = &e.record;
                let child = option_str_tokens(&e.child);
                let grandchild = option_str_tokens(&e.grandchild);
                quote! {
                    Some(pgbulk::mapping::CompositeMapping {
                        shard: #shard,
                        record: #record,
                        child: #child,
                        grandchild: #grandchild,
                    })
                }
            }
            None => quote! { None },
        };

        let (inner_ty, optional) = unwrap_option(&field.ty);
        let (source_kind, accessor) =
            accessor_tokens(field, field_ident, inner_ty, optional, enumeration)?;

        spec_tokens.push(quote! {
            pgbulk::mapping::FieldSpec::value(
                #field_str,
                vec![#(#mapping_tokens),*],
                #composite_tokens,
                #source_kind,
                #accessor,
            )
        });
    }

    let expanded = quote! {
        impl pgbulk::mapping::BulkRecord for #name {
            fn type_name() -> &'static str {
                #name_str
            }

            fn field_specs() -> Vec<pgbulk::mapping::FieldSpec<Self>> {
                vec![
                    #(#spec_tokens),*
                ]
            }
        }
    };

    Ok(TokenStream::from(expanded))
}

fn option_str_tokens(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(s) => quote! { Some(#s) },
        None => quote! { None },
    }
}

/// Map a `kind = ".."` string to a `PgKind` expression.
fn kind_tokens(
    field: &syn::Field,
    kind: &str,
    length: Option<u32>,
) -> Result<TokenStream2, syn::Error> {
    let tokens = match kind {
        "bool" => quote! { pgbulk::wire::PgKind::Bool },
        "int2" => quote! { pgbulk::wire::PgKind::Int2 },
        "int4" => quote! { pgbulk::wire::PgKind::Int4 },
        "int8" => quote! { pgbulk::wire::PgKind::Int8 },
        "float4" => quote! { pgbulk::wire::PgKind::Float4 },
        "float8" => quote! { pgbulk::wire::PgKind::Float8 },
        "text" => quote! { pgbulk::wire::PgKind::Text },
        "varchar" => {
            let len = length.ok_or_else(|| {
                syn::Error::new_spanned(field, "kind = \"varchar\" requires length = ..")
            })?;
            quote! { pgbulk::wire::PgKind::Varchar(#len) }
        }
        "bytea" => quote! { pgbulk::wire::PgKind::Bytea },
        "uuid" => quote! { pgbulk::wire::PgKind::Uuid },
        "timestamp" => quote! { pgbulk::wire::PgKind::Timestamp },
        "timestamptz" => quote! { pgbulk::wire::PgKind::TimestampTz },
        "date" => quote! { pgbulk::wire::PgKind::Date },
        other => {
            return Err(syn::Error::new_spanned(
                field,
                format!("unknown wire kind '{other}'"),
            ))
        }
    };
    if length.is_some() && kind != "varchar" {
        return Err(syn::Error::new_spanned(
            field,
            "length = .. is only valid with kind = \"varchar\"",
        ));
    }
    Ok(tokens)
}

/// Peel `Option<..>`, returning the inner type and whether it was optional.
fn unwrap_option(ty: &Type) -> (&Type, bool) {
    if let Type::Path(type_path) = ty {
        if let Some(seg) = type_path.path.segments.last() {
            if seg.ident == "Option" {
                if let syn::PathArguments::AngleBracketed(args) = &seg.arguments {
                    if let Some(syn::GenericArgument::Type(inner)) = args.args.first() {
                        return (inner, true);
                    }
                }
            }
        }
    }
    (ty, false)
}

/// Build the `SourceKind` tag and the extraction closure for a field.
fn accessor_tokens(
    field: &syn::Field,
    ident: &syn::Ident,
    inner_ty: &Type,
    optional: bool,
    enumeration: bool,
) -> Result<(TokenStream2, TokenStream2), syn::Error> {
    // (source kind, FieldValue expression over a borrowed value `v`)
    let (kind, value_expr): (TokenStream2, TokenStream2) = if enumeration {
        (
            quote! { pgbulk::value::SourceKind::Enum },
            quote! {
                pgbulk::value::FieldValue::Enum {
                    name: pgbulk::mapping::BulkEnum::variant_name(v),
                    ordinal: pgbulk::mapping::BulkEnum::ordinal(v),
                }
            },
        )
    } else {
        let ty_name = type_ident_name(inner_ty).ok_or_else(|| {
            syn::Error::new_spanned(inner_ty, "unsupported type for BulkRecord")
        })?;
        match ty_name.as_str() {
            "bool" => (
                quote! { pgbulk::value::SourceKind::Bool },
                quote! { pgbulk::value::FieldValue::Bool(*v) },
            ),
            "i16" => (
                quote! { pgbulk::value::SourceKind::I16 },
                quote! { pgbulk::value::FieldValue::I16(*v) },
            ),
            "i32" => (
                quote! { pgbulk::value::SourceKind::I32 },
                quote! { pgbulk::value::FieldValue::I32(*v) },
            ),
            "i64" => (
                quote! { pgbulk::value::SourceKind::I64 },
                quote! { pgbulk::value::FieldValue::I64(*v) },
            ),
            "f32" => (
                quote! { pgbulk::value::SourceKind::F32 },
                quote! { pgbulk::value::FieldValue::F32(*v) },
            ),
            "f64" => (
                quote! { pgbulk::value::SourceKind::F64 },
                quote! { pgbulk::value::FieldValue::F64(*v) },
            ),
            "String" => (
                quote! { pgbulk::value::SourceKind::Text },
                quote! { pgbulk::value::FieldValue::Text(v.as_str()) },
            ),
            "Vec" => (
                quote! { pgbulk::value::SourceKind::Bytes },
                quote! { pgbulk::value::FieldValue::Bytes(v.as_slice()) },
            ),
            "Uuid" => (
                quote! { pgbulk::value::SourceKind::Uuid },
                quote! { pgbulk::value::FieldValue::Uuid(*v) },
            ),
            "NaiveDateTime" => (
                quote! { pgbulk::value::SourceKind::Timestamp },
                quote! { pgbulk::value::FieldValue::Timestamp(*v) },
            ),
            "DateTime" => (
                quote! { pgbulk::value::SourceKind::TimestampTz },
                quote! { pgbulk::value::FieldValue::TimestampTz(*v) },
            ),
            "NaiveDate" => (
                quote! { pgbulk::value::SourceKind::Date },
                quote! { pgbulk::value::FieldValue::Date(*v) },
            ),
            "EntityId" => (
                quote! { pgbulk::value::SourceKind::Entity },
                quote! { pgbulk::value::FieldValue::Entity(*v) },
            ),
            other => {
                return Err(syn::Error::new_spanned(
                    field,
                    format!(
                        "unsupported type '{other}' for a column mapping \
                         (use `enumeration` for enums, `nested` for sub-records)"
                    ),
                ))
            }
        }
    };

    let accessor = if optional {
        quote! {
            |r: &Self| match &r.#ident {
                Some(v) => #value_expr,
                None => pgbulk::value::FieldValue::Null,
            }
        }
    } else {
        quote! {
            |r: &Self| {
                let v = &r.#ident;
                #value_expr
            }
        }
    };

    Ok((kind, accessor))
}

fn enum_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;

    let variants = match &input.data {
        Data::Enum(data) => &data.variants,
        _ => {
            return Err(syn::Error::new_spanned(name, "BulkEnum only supports enums"));
        }
    };

    let mut ordinal_arms = Vec::new();
    let mut name_arms = Vec::new();
    let mut next_ordinal: i32 = 0;

    for variant in variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "BulkEnum only supports fieldless variants",
            ));
        }
        if let Some((_, expr)) = &variant.discriminant {
            match expr {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Int(lit),
                    ..
                }) => {
                    next_ordinal = lit.base10_parse()?;
                }
                _ => {
                    return Err(syn::Error::new_spanned(
                        expr,
                        "BulkEnum discriminants must be integer literals",
                    ))
                }
            }
        }
        let variant_ident = &variant.ident;
        let variant_str = variant_ident.to_string();
        let ordinal = next_ordinal;
        ordinal_arms.push(quote! { #name::#variant_ident => #ordinal });
        name_arms.push(quote! { #name::#variant_ident => #variant_str });
        next_ordinal += 1;
    }

    let expanded = quote! {
        impl pgbulk::mapping::BulkEnum for #name {
            fn ordinal(&self) -> i32 {
                match self {
                    #(#ordinal_arms),*
                }
            }

            fn variant_name(&self) -> &'static str {
                match self {
                    #(#name_arms),*
                }
            }
        }
    };

    Ok(TokenStream::from(expanded))
}

/// Extract the last path segment ident name from a type (e.g. `i32`, `Uuid`).
fn type_ident_name(ty: &Type) -> Option<String> {
    if let Type::Path(type_path) = ty {
        type_path
            .path
            .segments
            .last()
            .map(|seg| seg.ident.to_string())
    } else {
        None
    }
}
