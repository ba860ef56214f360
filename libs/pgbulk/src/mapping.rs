use std::sync::Arc;

use crate::error::BulkError;
use crate::value::{FieldValue, SourceKind};
use crate::walker::ColumnPlan;
use crate::wire::PgKind;

/// Compiled, immutable metadata for one destination column.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    /// Destination column name, as declared by the caller.
    pub name: &'static str,
    /// `"Name" type` fragment for CREATE TABLE.
    pub ddl: String,
    pub kind: PgKind,
}

impl ColumnDescriptor {
    pub fn new(name: &'static str, kind: PgKind) -> Self {
        ColumnDescriptor {
            name,
            ddl: format!("\"{name}\" {}", kind.ddl_type()),
            kind,
        }
    }
}

/// One `#[bulk(column = ..)]` annotation.
#[derive(Debug, Clone, Copy)]
pub struct ScalarMapping {
    pub column: &'static str,
    pub kind: PgKind,
}

/// `#[bulk(entity(..))]` annotation: names which of the field's own column
/// mappings supply each identifier part.
#[derive(Debug, Clone, Copy)]
pub struct CompositeMapping {
    pub shard: &'static str,
    pub record: &'static str,
    pub child: Option<&'static str>,
    pub grandchild: Option<&'static str>,
}

/// Value accessor: extracts one field of a record. Shared between the
/// columns of a composite-identifier group.
pub type Accessor<T> = Arc<dyn for<'a> Fn(&'a T) -> FieldValue<'a> + Send + Sync>;

/// Where a field's data comes from.
pub enum FieldSource<T> {
    /// Direct value extraction.
    Value { kind: SourceKind, get: Accessor<T> },
    /// Sub-record whose own mapped fields are flattened into the parent.
    Nested(Box<dyn NestedSource<T>>),
}

/// Recursion seam for nested mapped sub-records.
pub trait NestedSource<T>: Send + Sync {
    fn walk(&self) -> Result<Vec<ColumnPlan<T>>, BulkError>;
}

/// Declarative metadata for one source field, emitted by the derive in
/// declaration order. Semantic validation happens in the walker, at first
/// use of the type.
pub struct FieldSpec<T> {
    pub field: &'static str,
    /// All column annotations on the field, in attribute order.
    pub mappings: Vec<ScalarMapping>,
    pub composite: Option<CompositeMapping>,
    pub source: FieldSource<T>,
}

impl<T> FieldSpec<T> {
    pub fn value<F>(
        field: &'static str,
        mappings: Vec<ScalarMapping>,
        composite: Option<CompositeMapping>,
        kind: SourceKind,
        get: F,
    ) -> Self
    where
        F: for<'a> Fn(&'a T) -> FieldValue<'a> + Send + Sync + 'static,
    {
        FieldSpec {
            field,
            mappings,
            composite,
            source: FieldSource::Value {
                kind,
                get: Arc::new(get),
            },
        }
    }

    pub fn nested<U>(field: &'static str, project: fn(&T) -> &U) -> Self
    where
        T: 'static,
        U: BulkRecord + 'static,
    {
        FieldSpec {
            field,
            mappings: Vec::new(),
            composite: None,
            source: FieldSource::Nested(Box::new(NestedField { project })),
        }
    }
}

struct NestedField<T, U> {
    project: fn(&T) -> &U,
}

impl<T, U> NestedSource<T> for NestedField<T, U>
where
    T: 'static,
    U: BulkRecord + 'static,
{
    fn walk(&self) -> Result<Vec<ColumnPlan<T>>, BulkError> {
        let project = self.project;
        Ok(crate::walker::walk_fields::<U>()?
            .into_iter()
            .map(|plan| plan.lift(project))
            .collect())
    }
}

/// A record type whose fields carry bulk-load mapping annotations.
///
/// Implemented via `#[derive(BulkRecord)]`; the derive emits the field
/// metadata, the library compiles it once per type.
pub trait BulkRecord: Sized {
    fn type_name() -> &'static str;
    fn field_specs() -> Vec<FieldSpec<Self>>;
}

/// Enumeration renderable on the wire as either its symbolic name or its
/// integer ordinal, chosen by the column's wire type.
pub trait BulkEnum {
    fn ordinal(&self) -> i32;
    fn variant_name(&self) -> &'static str;
}
