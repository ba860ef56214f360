use crate::value::SourceKind;
use crate::wire::PgKind;

#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    #[error("invalid target name '{0}': only alphanumerics and one '.' separator allowed")]
    InvalidTarget(String),

    #[error("field '{field}': more than one column mapping without a composite-identifier marker")]
    AmbiguousMapping { field: String },

    #[error("field '{field}': composite identifier is missing its {part} part column '{column}'")]
    MissingPart {
        field: String,
        part: &'static str,
        column: String,
    },

    #[error("field '{field}': column '{column}' does not belong to the identifier declaration")]
    UnknownPart { field: String, column: String },

    #[error("field '{field}': wire type {kind:?} does not accept source type {source_kind:?}")]
    Incompatible {
        field: String,
        kind: PgKind,
        source_kind: SourceKind,
    },

    #[error("field '{field}': identifier part value {value} does not fit an int4 column")]
    PartRange { field: String, value: i64 },

    #[error("type '{0}' has no mapped columns")]
    NoColumns(&'static str),

    #[error("field '{field}': extracted value does not match compiled column shape")]
    ValueShape { field: String },

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}
