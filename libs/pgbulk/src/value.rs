use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::entity::EntityId;

/// Canonical extracted field value.
///
/// Accessors generated by the derive produce one of these per field per row.
/// `Null` covers reference absence (`Option::None`); value-type sentinels
/// (NaN floats, nil UUIDs, empty identifiers) are resolved by the compiled
/// column writer, which knows the field's null strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    /// Borrowed — zero-copy from the record.
    Text(&'a str),
    Bytes(&'a [u8]),
    Uuid(Uuid),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    /// Rendered as the symbolic name for text-family columns,
    /// as the ordinal for everything else.
    Enum { name: &'static str, ordinal: i32 },
    Entity(EntityId),
}

/// Source-side type tag, used by the wire-type compatibility predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
    Bytes,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Enum,
    Entity,
}
