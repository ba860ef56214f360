use crate::error::BulkError;
use crate::mapping::{Accessor, BulkRecord};
use crate::value::FieldValue;
use crate::walker::{self, ColumnPlan, IdPart, NullCheck};
use crate::wire::{PgKind, RowBuffer};

/// Placeholder substituted by the target name resolver.
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Compiled row-writing function: one record onto the binary channel,
/// columns in compiled order.
pub type RowWriter<T> = Box<dyn Fn(&T, &mut RowBuffer) -> Result<(), BulkError> + Send + Sync>;

/// Per-type compiled artifact: statement templates plus the row writer.
/// Built once per type, shared by all loads of that type.
pub struct Artifact<T> {
    pub ddl_template: String,
    pub copy_template: String,
    pub row: RowWriter<T>,
    columns: Vec<&'static str>,
}

impl<T> std::fmt::Debug for Artifact<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifact")
            .field("ddl_template", &self.ddl_template)
            .field("copy_template", &self.copy_template)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl<T> Artifact<T> {
    /// Destination column names in compiled order.
    pub fn column_names(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn column_count(&self) -> i16 {
        self.columns.len() as i16
    }
}

/// Walk a type's metadata and compile it into an artifact.
///
/// The returned writer is a straight-line composition of per-column
/// closures, each specialized on its wire type and null strategy at compile
/// time — per-row execution carries no type dispatch beyond the null check.
pub fn compile<T: BulkRecord + 'static>() -> Result<Artifact<T>, BulkError> {
    let plans = walker::walk::<T>()?;

    let ddl_cols: Vec<String> = plans
        .iter()
        .map(|p| format!("{} NULL", p.descriptor.ddl))
        .collect();
    let copy_cols: Vec<String> = plans
        .iter()
        .map(|p| format!("\"{}\"", p.descriptor.name))
        .collect();
    let columns: Vec<&'static str> = plans.iter().map(|p| p.descriptor.name).collect();

    let ddl_template = format!("CREATE {TARGET_PLACEHOLDER} ({})", ddl_cols.join(", "));
    let copy_template = format!(
        "COPY {TARGET_PLACEHOLDER} ({}) FROM STDIN (FORMAT BINARY)",
        copy_cols.join(", ")
    );

    let writers: Vec<RowWriter<T>> = plans.into_iter().map(column_writer).collect();
    let count = writers.len() as i16;
    let row: RowWriter<T> = Box::new(move |record, buf| {
        buf.start_row(count);
        for write in &writers {
            write(record, buf)?;
        }
        Ok(())
    });

    Ok(Artifact {
        ddl_template,
        copy_template,
        row,
        columns,
    })
}

/// Specialize one column's writer on (wire type, null strategy, id part).
fn column_writer<T: 'static>(plan: ColumnPlan<T>) -> RowWriter<T> {
    let ColumnPlan {
        field,
        get,
        descriptor,
        null_check,
        part,
    } = plan;
    let kind = descriptor.kind;

    if let Some(part) = part {
        return part_writer(field, get, kind, part);
    }

    match kind {
        PgKind::Bool => value_writer(field, get, |buf, v| match v {
            FieldValue::Bool(b) => Some(buf.put_bool(b)),
            _ => None,
        }),
        PgKind::Int2 => value_writer(field, get, |buf, v| match v {
            FieldValue::I16(n) => Some(buf.put_i16(n)),
            _ => None,
        }),
        PgKind::Int4 => value_writer(field, get, |buf, v| match v {
            FieldValue::I32(n) => Some(buf.put_i32(n)),
            FieldValue::Enum { ordinal, .. } => Some(buf.put_i32(ordinal)),
            _ => None,
        }),
        PgKind::Int8 => value_writer(field, get, |buf, v| match v {
            FieldValue::I64(n) => Some(buf.put_i64(n)),
            FieldValue::Enum { ordinal, .. } => Some(buf.put_i64(ordinal as i64)),
            _ => None,
        }),
        PgKind::Float4 => Box::new(move |record, buf| match get(record) {
            FieldValue::Null => {
                buf.put_null();
                Ok(())
            }
            FieldValue::F32(n) if n.is_nan() && null_check == NullCheck::Nan => {
                buf.put_null();
                Ok(())
            }
            FieldValue::F32(n) => {
                buf.put_f32(n);
                Ok(())
            }
            _ => Err(shape(field)),
        }),
        PgKind::Float8 => Box::new(move |record, buf| match get(record) {
            FieldValue::Null => {
                buf.put_null();
                Ok(())
            }
            FieldValue::F64(n) if n.is_nan() && null_check == NullCheck::Nan => {
                buf.put_null();
                Ok(())
            }
            FieldValue::F64(n) => {
                buf.put_f64(n);
                Ok(())
            }
            _ => Err(shape(field)),
        }),
        PgKind::Text | PgKind::Varchar(_) => value_writer(field, get, |buf, v| match v {
            FieldValue::Text(s) => Some(buf.put_text(s)),
            FieldValue::Enum { name, .. } => Some(buf.put_text(name)),
            _ => None,
        }),
        PgKind::Bytea => value_writer(field, get, |buf, v| match v {
            FieldValue::Bytes(b) => Some(buf.put_bytes(b)),
            _ => None,
        }),
        PgKind::Uuid => Box::new(move |record, buf| match get(record) {
            FieldValue::Null => {
                buf.put_null();
                Ok(())
            }
            FieldValue::Uuid(u) if u.is_nil() && null_check == NullCheck::NilUuid => {
                buf.put_null();
                Ok(())
            }
            FieldValue::Uuid(u) => {
                buf.put_uuid(u);
                Ok(())
            }
            _ => Err(shape(field)),
        }),
        PgKind::Timestamp => value_writer(field, get, |buf, v| match v {
            FieldValue::Timestamp(t) => Some(buf.put_timestamp(t)),
            _ => None,
        }),
        PgKind::TimestampTz => value_writer(field, get, |buf, v| match v {
            FieldValue::TimestampTz(t) => Some(buf.put_timestamptz(t)),
            _ => None,
        }),
        PgKind::Date => value_writer(field, get, |buf, v| match v {
            FieldValue::Date(d) => Some(buf.put_date(d)),
            _ => None,
        }),
    }
}

/// Writer for one part of a composite-identifier group. An EMPTY identifier
/// (or an unset optional one) nulls every part.
fn part_writer<T: 'static>(
    field: &'static str,
    get: Accessor<T>,
    kind: PgKind,
    part: IdPart,
) -> RowWriter<T> {
    Box::new(move |record, buf| {
        let id = match get(record) {
            FieldValue::Null => {
                buf.put_null();
                return Ok(());
            }
            FieldValue::Entity(id) if id.is_empty() => {
                buf.put_null();
                return Ok(());
            }
            FieldValue::Entity(id) => id,
            _ => return Err(shape(field)),
        };
        let value = match part {
            IdPart::Shard => {
                buf.put_i16(id.shard);
                return Ok(());
            }
            IdPart::Record => Some(id.record),
            IdPart::Child => id.child,
            IdPart::Grandchild => id.grandchild,
        };
        match (value, kind) {
            (None, _) => buf.put_null(),
            (Some(v), PgKind::Int4) => {
                let narrow = i32::try_from(v).map_err(|_| BulkError::PartRange {
                    field: field.to_string(),
                    value: v,
                })?;
                buf.put_i32(narrow);
            }
            (Some(v), _) => buf.put_i64(v),
        }
        Ok(())
    })
}

fn value_writer<T: 'static>(
    field: &'static str,
    get: Accessor<T>,
    put: impl Fn(&mut RowBuffer, FieldValue<'_>) -> Option<()> + Send + Sync + 'static,
) -> RowWriter<T> {
    Box::new(move |record, buf| match get(record) {
        FieldValue::Null => {
            buf.put_null();
            Ok(())
        }
        v => put(buf, v).ok_or_else(|| shape(field)),
    })
}

fn shape(field: &'static str) -> BulkError {
    BulkError::ValueShape {
        field: field.to_string(),
    }
}
