use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::value::SourceKind;

/// PostgreSQL binary COPY stream signature.
pub(crate) const COPY_SIGNATURE: &[u8] = b"PGCOPY\n\xff\r\n\0";

/// Microseconds between the Unix epoch and 2000-01-01, the Postgres epoch.
const PG_EPOCH_MICROS: i64 = 946_684_800_000_000;

/// Days from 0001-01-01 (CE) to 2000-01-01.
const PG_EPOCH_CE_DAYS: i32 = 730_120;

/// Wire-type catalog: how a column value is encoded on the binary channel
/// and which DDL type the column gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Varchar(u32),
    Bytea,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
}

impl PgKind {
    /// DDL column type for CREATE TABLE fragments.
    pub fn ddl_type(&self) -> String {
        match self {
            PgKind::Bool => "boolean".into(),
            PgKind::Int2 => "smallint".into(),
            PgKind::Int4 => "integer".into(),
            PgKind::Int8 => "bigint".into(),
            PgKind::Float4 => "real".into(),
            PgKind::Float8 => "double precision".into(),
            PgKind::Text => "text".into(),
            PgKind::Varchar(len) => format!("varchar({len})"),
            PgKind::Bytea => "bytea".into(),
            PgKind::Uuid => "uuid".into(),
            PgKind::Timestamp => "timestamp".into(),
            PgKind::TimestampTz => "timestamptz".into(),
            PgKind::Date => "date".into(),
        }
    }

    /// Compatibility predicate: can a value of `source` be written under
    /// this wire type? Enums are accepted by text-family kinds (symbolic
    /// name) and by `Int4`/`Int8` (ordinal).
    pub fn accepts(&self, source: SourceKind) -> bool {
        match self {
            PgKind::Bool => source == SourceKind::Bool,
            PgKind::Int2 => source == SourceKind::I16,
            PgKind::Int4 => matches!(source, SourceKind::I32 | SourceKind::Enum),
            PgKind::Int8 => matches!(source, SourceKind::I64 | SourceKind::Enum),
            PgKind::Float4 => source == SourceKind::F32,
            PgKind::Float8 => source == SourceKind::F64,
            PgKind::Text | PgKind::Varchar(_) => {
                matches!(source, SourceKind::Text | SourceKind::Enum)
            }
            PgKind::Bytea => source == SourceKind::Bytes,
            PgKind::Uuid => source == SourceKind::Uuid,
            PgKind::Timestamp => source == SourceKind::Timestamp,
            PgKind::TimestampTz => source == SourceKind::TimestampTz,
            PgKind::Date => source == SourceKind::Date,
        }
    }

    /// Whether values render as text on the wire (decides enum name vs ordinal).
    pub fn is_text(&self) -> bool {
        matches!(self, PgKind::Text | PgKind::Varchar(_))
    }
}

/// Append-only encoder for the binary COPY row format.
///
/// Layout per stream: signature header, then per row a 16-bit field count
/// followed by each field as a 32-bit byte length (-1 for null) and the
/// value bytes, then a -1 field count as trailer.
pub struct RowBuffer {
    buf: BytesMut,
}

impl RowBuffer {
    /// Fresh buffer with the stream header already written.
    pub fn new() -> Self {
        let mut buf = BytesMut::with_capacity(128 * 1024);
        buf.extend_from_slice(COPY_SIGNATURE);
        buf.put_i32(0); // flags: no OIDs
        buf.put_i32(0); // header extension length
        RowBuffer { buf }
    }

    /// Buffer without the stream header, for row-level assertions in tests
    /// and for continuation chunks after a flush.
    pub fn bare() -> Self {
        RowBuffer {
            buf: BytesMut::with_capacity(128 * 1024),
        }
    }

    pub fn start_row(&mut self, columns: i16) {
        self.buf.put_i16(columns);
    }

    pub fn put_null(&mut self) {
        self.buf.put_i32(-1);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_i32(1);
        self.buf.put_u8(v as u8);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i32(2);
        self.buf.put_i16(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32(4);
        self.buf.put_i32(v);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.put_i32(8);
        self.buf.put_i64(v);
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_i32(4);
        self.buf.put_f32(v);
    }

    pub fn put_f64(&mut self, v: f64) {
        self.buf.put_i32(8);
        self.buf.put_f64(v);
    }

    pub fn put_text(&mut self, v: &str) {
        let bytes = v.as_bytes();
        self.buf.put_i32(bytes.len() as i32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_bytes(&mut self, v: &[u8]) {
        self.buf.put_i32(v.len() as i32);
        self.buf.extend_from_slice(v);
    }

    pub fn put_uuid(&mut self, v: Uuid) {
        self.buf.put_i32(16);
        self.buf.extend_from_slice(v.as_bytes());
    }

    /// Timestamp without zone: microseconds since the Postgres epoch.
    pub fn put_timestamp(&mut self, v: NaiveDateTime) {
        self.buf.put_i32(8);
        self.buf.put_i64(v.and_utc().timestamp_micros() - PG_EPOCH_MICROS);
    }

    pub fn put_timestamptz(&mut self, v: DateTime<Utc>) {
        self.buf.put_i32(8);
        self.buf.put_i64(v.timestamp_micros() - PG_EPOCH_MICROS);
    }

    /// Date: days since 2000-01-01.
    pub fn put_date(&mut self, v: NaiveDate) {
        self.buf.put_i32(4);
        self.buf.put_i32(v.num_days_from_ce() - PG_EPOCH_CE_DAYS);
    }

    /// End-of-data marker. The server validates row/column counts after it.
    pub fn finish(&mut self) {
        self.buf.put_i16(-1);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Detach everything buffered so far for sending, leaving the buffer
    /// ready for further rows.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl Default for RowBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let buf = RowBuffer::new();
        let bytes = buf.as_slice();
        assert_eq!(&bytes[..11], COPY_SIGNATURE);
        assert_eq!(&bytes[11..19], &[0u8; 8][..]);
    }

    #[test]
    fn null_is_minus_one_length() {
        let mut buf = RowBuffer::bare();
        buf.put_null();
        assert_eq!(buf.as_slice(), &(-1i32).to_be_bytes()[..]);
    }

    #[test]
    fn scalar_encodings_are_length_prefixed() {
        let mut buf = RowBuffer::bare();
        buf.put_i16(2);
        buf.put_i32(100);
        buf.put_text("x");
        let mut want = Vec::new();
        want.extend_from_slice(&2i32.to_be_bytes());
        want.extend_from_slice(&2i16.to_be_bytes());
        want.extend_from_slice(&4i32.to_be_bytes());
        want.extend_from_slice(&100i32.to_be_bytes());
        want.extend_from_slice(&1i32.to_be_bytes());
        want.push(b'x');
        assert_eq!(buf.as_slice(), &want[..]);
    }

    #[test]
    fn timestamp_uses_postgres_epoch() {
        let mut buf = RowBuffer::bare();
        let pg_epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        buf.put_timestamp(pg_epoch);
        let mut want = Vec::new();
        want.extend_from_slice(&8i32.to_be_bytes());
        want.extend_from_slice(&0i64.to_be_bytes());
        assert_eq!(buf.as_slice(), &want[..]);
    }

    #[test]
    fn date_uses_postgres_epoch() {
        let mut buf = RowBuffer::bare();
        buf.put_date(NaiveDate::from_ymd_opt(2000, 1, 2).unwrap());
        let mut want = Vec::new();
        want.extend_from_slice(&4i32.to_be_bytes());
        want.extend_from_slice(&1i32.to_be_bytes());
        assert_eq!(buf.as_slice(), &want[..]);
    }

    #[test]
    fn trailer_is_minus_one_field_count() {
        let mut buf = RowBuffer::bare();
        buf.finish();
        assert_eq!(buf.as_slice(), &(-1i16).to_be_bytes()[..]);
    }

    #[test]
    fn enum_rendering_follows_wire_family() {
        assert!(PgKind::Text.accepts(SourceKind::Enum));
        assert!(PgKind::Varchar(16).accepts(SourceKind::Enum));
        assert!(PgKind::Int4.accepts(SourceKind::Enum));
        assert!(PgKind::Int8.accepts(SourceKind::Enum));
        assert!(!PgKind::Int2.accepts(SourceKind::Enum));
        assert!(PgKind::Text.is_text());
        assert!(!PgKind::Int4.is_text());
    }
}
