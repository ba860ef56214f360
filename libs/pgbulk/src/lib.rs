//! Typed bulk loading for PostgreSQL over the binary COPY protocol.
//!
//! Annotate a record type with `#[derive(BulkRecord)]` and per-field
//! `#[bulk(..)]` mappings; the library compiles the metadata once per type
//! into a CREATE/COPY statement pair and a specialized row writer, caches
//! the result process-wide, and streams record collections into a permanent
//! or session-temporary table through `tokio_postgres::CopyInSink`.

pub mod cache;
pub mod compiler;
pub mod entity;
pub mod error;
pub mod loader;
pub mod mapping;
pub mod target;
pub mod value;
pub mod walker;
pub mod wire;

pub use cache::ArtifactCache;
pub use entity::{EntityId, EntityTag};
pub use error::BulkError;
pub use loader::{
    BulkConnection, CopySink, load_identifier_pairs, load_identifier_triples, load_records,
};
pub use mapping::{BulkEnum, BulkRecord};
pub use value::{FieldValue, SourceKind};
pub use wire::{PgKind, RowBuffer};

pub use pgbulk_derive::BulkEnum;
pub use pgbulk_derive::BulkRecord;
