use crate::error::BulkError;
use crate::mapping::{
    Accessor, BulkRecord, ColumnDescriptor, CompositeMapping, FieldSource, ScalarMapping,
};
use crate::value::SourceKind;
use crate::wire::PgKind;

/// How a column decides between a real value and a wire-level null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullCheck {
    /// The accessor itself yields `FieldValue::Null` (Option / reference absence).
    Accessor,
    /// NaN floats are written as null.
    Nan,
    /// The nil UUID is written as null.
    NilUuid,
    /// Every part of an EMPTY identifier is written as null.
    EmptyEntity,
}

/// Which part of a composite identifier a column carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPart {
    Shard,
    Record,
    Child,
    Grandchild,
}

impl IdPart {
    pub fn name(&self) -> &'static str {
        match self {
            IdPart::Shard => "shard",
            IdPart::Record => "record",
            IdPart::Child => "child",
            IdPart::Grandchild => "grandchild",
        }
    }
}

/// One resolved column: accessor + descriptor + null strategy, in final
/// column order. Input to the row-writer compiler.
pub struct ColumnPlan<T> {
    pub field: &'static str,
    pub get: Accessor<T>,
    pub descriptor: ColumnDescriptor,
    pub null_check: NullCheck,
    /// Set for composite-identifier group columns.
    pub part: Option<IdPart>,
}

impl<T> std::fmt::Debug for ColumnPlan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnPlan")
            .field("field", &self.field)
            .field("descriptor", &self.descriptor)
            .field("null_check", &self.null_check)
            .field("part", &self.part)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> ColumnPlan<T> {
    /// Re-root the accessor under a parent record (nested flattening).
    pub(crate) fn lift<P: 'static>(self, project: fn(&P) -> &T) -> ColumnPlan<P> {
        let get = self.get;
        ColumnPlan {
            field: self.field,
            get: std::sync::Arc::new(move |p: &P| get(project(p))),
            descriptor: self.descriptor,
            null_check: self.null_check,
            part: self.part,
        }
    }
}

/// Walk a type's field metadata into an ordered column plan.
///
/// Column order is the source declaration order, with nested sub-records
/// flattened in place. A type that resolves to zero columns is an error.
pub fn walk<T: BulkRecord>() -> Result<Vec<ColumnPlan<T>>, BulkError> {
    let plans = walk_fields::<T>()?;
    if plans.is_empty() {
        return Err(BulkError::NoColumns(T::type_name()));
    }
    Ok(plans)
}

/// Field walk without the zero-column check, reused for nested recursion.
pub(crate) fn walk_fields<T: BulkRecord>() -> Result<Vec<ColumnPlan<T>>, BulkError> {
    let mut plans = Vec::new();
    for spec in T::field_specs() {
        match spec.source {
            FieldSource::Nested(nested) => {
                plans.extend(nested.walk()?);
            }
            FieldSource::Value { kind, get } => {
                if let Some(composite) = spec.composite {
                    resolve_composite(&mut plans, spec.field, &spec.mappings, composite, kind, get)?;
                } else {
                    match spec.mappings.as_slice() {
                        [] => {}
                        [mapping] => plans.push(scalar_plan(spec.field, *mapping, kind, get)?),
                        _ => {
                            return Err(BulkError::AmbiguousMapping {
                                field: spec.field.to_string(),
                            });
                        }
                    }
                }
            }
        }
    }
    Ok(plans)
}

fn scalar_plan<T>(
    field: &'static str,
    mapping: ScalarMapping,
    kind: SourceKind,
    get: Accessor<T>,
) -> Result<ColumnPlan<T>, BulkError> {
    if kind == SourceKind::Entity || !mapping.kind.accepts(kind) {
        return Err(BulkError::Incompatible {
            field: field.to_string(),
            kind: mapping.kind,
            source_kind: kind,
        });
    }
    let null_check = match kind {
        SourceKind::F32 | SourceKind::F64 => NullCheck::Nan,
        SourceKind::Uuid => NullCheck::NilUuid,
        _ => NullCheck::Accessor,
    };
    tracing::trace!(field, column = mapping.column, kind = ?mapping.kind, "mapped column");
    Ok(ColumnPlan {
        field,
        get,
        descriptor: ColumnDescriptor::new(mapping.column, mapping.kind),
        null_check,
        part: None,
    })
}

/// Resolve a composite-identifier group: classify each of the field's column
/// mappings against the declared part names, validate part widths, and emit
/// one column per part in mapping order.
fn resolve_composite<T>(
    plans: &mut Vec<ColumnPlan<T>>,
    field: &'static str,
    mappings: &[ScalarMapping],
    composite: CompositeMapping,
    kind: SourceKind,
    get: Accessor<T>,
) -> Result<(), BulkError> {
    if kind != SourceKind::Entity {
        return Err(BulkError::Incompatible {
            field: field.to_string(),
            kind: mappings.first().map(|m| m.kind).unwrap_or(PgKind::Int8),
            source_kind: kind,
        });
    }

    let mut seen = [false; 4];
    for mapping in mappings {
        let part = if mapping.column == composite.shard {
            IdPart::Shard
        } else if mapping.column == composite.record {
            IdPart::Record
        } else if Some(mapping.column) == composite.child {
            IdPart::Child
        } else if Some(mapping.column) == composite.grandchild {
            IdPart::Grandchild
        } else {
            return Err(BulkError::UnknownPart {
                field: field.to_string(),
                column: mapping.column.to_string(),
            });
        };

        let width_ok = match part {
            IdPart::Shard => mapping.kind == PgKind::Int2,
            _ => matches!(mapping.kind, PgKind::Int4 | PgKind::Int8),
        };
        if !width_ok {
            return Err(BulkError::Incompatible {
                field: field.to_string(),
                kind: mapping.kind,
                source_kind: SourceKind::Entity,
            });
        }

        seen[part_index(part)] = true;
        tracing::trace!(field, column = mapping.column, part = part.name(), "mapped identifier part");
        plans.push(ColumnPlan {
            field,
            get: get.clone(),
            descriptor: ColumnDescriptor::new(mapping.column, mapping.kind),
            null_check: NullCheck::EmptyEntity,
            part: Some(part),
        });
    }

    let required: [(IdPart, Option<&'static str>); 4] = [
        (IdPart::Shard, Some(composite.shard)),
        (IdPart::Record, Some(composite.record)),
        (IdPart::Child, composite.child),
        (IdPart::Grandchild, composite.grandchild),
    ];
    for (part, column) in required {
        if let Some(column) = column {
            if !seen[part_index(part)] {
                return Err(BulkError::MissingPart {
                    field: field.to_string(),
                    part: part.name(),
                    column: column.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn part_index(part: IdPart) -> usize {
    match part {
        IdPart::Shard => 0,
        IdPart::Record => 1,
        IdPart::Child => 2,
        IdPart::Grandchild => 3,
    }
}
