use std::pin::Pin;

use bytes::Bytes;
use futures::SinkExt;
use tokio_postgres::{Client, CopyInSink, Transaction};

use crate::cache::ArtifactCache;
use crate::compiler::TARGET_PLACEHOLDER;
use crate::entity::EntityId;
use crate::error::BulkError;
use crate::mapping::BulkRecord;
use crate::target::TargetName;
use crate::wire::RowBuffer;

/// Flush the copy buffer to the socket once it grows past this.
const FLUSH_WATERMARK: usize = 64 * 1024;

/// Connection seam: anything that can run DDL and open a binary COPY
/// channel. Implemented for `tokio_postgres::Client` and `Transaction`, so
/// callers decide the transaction discipline.
#[async_trait::async_trait]
pub trait BulkConnection {
    async fn execute_ddl(&self, sql: &str) -> Result<(), BulkError>;
    async fn open_copy(&self, sql: &str) -> Result<Box<dyn CopySink>, BulkError>;
}

/// Byte half of an open COPY: accepts stream chunks and reports the
/// server-side row count on `finish`.
#[async_trait::async_trait]
pub trait CopySink: Send {
    async fn send(&mut self, chunk: Bytes) -> Result<(), BulkError>;
    async fn finish(self: Box<Self>) -> Result<u64, BulkError>;
}

struct PgCopySink {
    inner: Pin<Box<CopyInSink<Bytes>>>,
}

#[async_trait::async_trait]
impl CopySink for PgCopySink {
    async fn send(&mut self, chunk: Bytes) -> Result<(), BulkError> {
        Ok(self.inner.send(chunk).await?)
    }

    async fn finish(mut self: Box<Self>) -> Result<u64, BulkError> {
        Ok(self.inner.as_mut().finish().await?)
    }
}

#[async_trait::async_trait]
impl BulkConnection for Client {
    async fn execute_ddl(&self, sql: &str) -> Result<(), BulkError> {
        self.execute(sql, &[]).await?;
        Ok(())
    }

    async fn open_copy(&self, sql: &str) -> Result<Box<dyn CopySink>, BulkError> {
        let inner = Box::pin(self.copy_in(sql).await?);
        Ok(Box::new(PgCopySink { inner }))
    }
}

#[async_trait::async_trait]
impl BulkConnection for Transaction<'_> {
    async fn execute_ddl(&self, sql: &str) -> Result<(), BulkError> {
        self.execute(sql, &[]).await?;
        Ok(())
    }

    async fn open_copy(&self, sql: &str) -> Result<Box<dyn CopySink>, BulkError> {
        let inner = Box::pin(self.copy_in(sql).await?);
        Ok(Box::new(PgCopySink { inner }))
    }
}

/// Binary import channel: buffered rows over a copy sink.
///
/// `complete()` is the only commit point — dropping the channel (or the
/// future driving it) before completion leaves the load uncommitted.
struct CopyChannel {
    sink: Box<dyn CopySink>,
    buf: RowBuffer,
}

impl CopyChannel {
    fn new(sink: Box<dyn CopySink>) -> Self {
        CopyChannel {
            sink,
            buf: RowBuffer::new(),
        }
    }

    async fn flush_watermark(&mut self) -> Result<(), BulkError> {
        if self.buf.len() > FLUSH_WATERMARK {
            self.sink.send(self.buf.take()).await?;
        }
        Ok(())
    }

    /// Trailer, final flush, server-side count validation.
    async fn complete(mut self) -> Result<u64, BulkError> {
        self.buf.finish();
        self.sink.send(self.buf.take()).await?;
        let rows = self.sink.finish().await?;
        Ok(rows)
    }
}

/// Bulk-load a sequence of mapped records into `target`.
///
/// Ensures the destination table exists (permanent for `schema.name`,
/// session-temporary for a bare name), then streams every record through a
/// binary COPY channel using the type's compiled row writer. The sequence
/// is traversed once. All-or-nothing: any failure before completion leaves
/// the load uncommitted. Returns the server-reported row count.
pub async fn load_records<T, C, I>(conn: &C, target: &str, records: I) -> Result<u64, BulkError>
where
    T: BulkRecord + Send + Sync + 'static,
    C: BulkConnection + ?Sized,
    I: IntoIterator<Item = T>,
{
    let artifact = ArtifactCache::global().get_or_compile::<T>()?;
    let target = TargetName::parse(target)?;
    let (create, copy) = target.materialize(&artifact.ddl_template, &artifact.copy_template);

    tracing::debug!(statement = %create, "ensuring bulk target");
    conn.execute_ddl(&create).await?;

    tracing::debug!(statement = %copy, "opening binary copy channel");
    let sink = conn.open_copy(&copy).await?;
    let mut chan = CopyChannel::new(sink);

    let mut streamed = 0u64;
    for record in records {
        (artifact.row)(&record, &mut chan.buf)?;
        streamed += 1;
        chan.flush_watermark().await?;
    }

    let rows = chan.complete().await?;
    tracing::info!(rows, streamed, record = T::type_name(), "bulk load complete");
    Ok(rows)
}

/// Bulk-load bare two-part identifiers as (`"ShardId"`, `"RecordId"`) rows,
/// bypassing the per-type compiler.
pub async fn load_identifier_pairs<C, I>(conn: &C, target: &str, ids: I) -> Result<u64, BulkError>
where
    C: BulkConnection + ?Sized,
    I: IntoIterator<Item = EntityId>,
{
    load_identifiers(conn, target, ids, false).await
}

/// Bulk-load bare three-part identifiers as (`"ShardId"`, `"RecordId"`,
/// `"ChildId"`) rows. Identifiers without a child part write a null child.
pub async fn load_identifier_triples<C, I>(conn: &C, target: &str, ids: I) -> Result<u64, BulkError>
where
    C: BulkConnection + ?Sized,
    I: IntoIterator<Item = EntityId>,
{
    load_identifiers(conn, target, ids, true).await
}

async fn load_identifiers<C, I>(
    conn: &C,
    target: &str,
    ids: I,
    with_child: bool,
) -> Result<u64, BulkError>
where
    C: BulkConnection + ?Sized,
    I: IntoIterator<Item = EntityId>,
{
    let target = TargetName::parse(target)?;
    let (ddl_cols, copy_cols) = if with_child {
        (
            "\"ShardId\" smallint NULL, \"RecordId\" bigint NULL, \"ChildId\" bigint NULL",
            "\"ShardId\", \"RecordId\", \"ChildId\"",
        )
    } else {
        (
            "\"ShardId\" smallint NULL, \"RecordId\" bigint NULL",
            "\"ShardId\", \"RecordId\"",
        )
    };
    let (create, copy) = target.materialize(
        &format!("CREATE {TARGET_PLACEHOLDER} ({ddl_cols})"),
        &format!("COPY {TARGET_PLACEHOLDER} ({copy_cols}) FROM STDIN (FORMAT BINARY)"),
    );

    tracing::debug!(statement = %create, "ensuring identifier bulk target");
    conn.execute_ddl(&create).await?;
    let sink = conn.open_copy(&copy).await?;
    let mut chan = CopyChannel::new(sink);

    for id in ids {
        put_identifier(&mut chan.buf, id, with_child);
        chan.flush_watermark().await?;
    }

    let rows = chan.complete().await?;
    tracing::info!(rows, "identifier bulk load complete");
    Ok(rows)
}

/// Fixed-shape identifier row. An EMPTY identifier nulls every part,
/// matching the compiled path's sentinel policy.
pub(crate) fn put_identifier(buf: &mut RowBuffer, id: EntityId, with_child: bool) {
    buf.start_row(if with_child { 3 } else { 2 });
    if id.is_empty() {
        buf.put_null();
        buf.put_null();
        if with_child {
            buf.put_null();
        }
        return;
    }
    buf.put_i16(id.shard);
    buf.put_i64(id.record);
    if with_child {
        match id.child {
            Some(child) => buf.put_i64(child),
            None => buf.put_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityTag;
    use crate::mapping::{FieldSpec, ScalarMapping};
    use crate::value::{FieldValue, SourceKind};
    use crate::wire::{COPY_SIGNATURE, PgKind};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        ddl: Vec<String>,
        copy: Vec<String>,
        chunks: Vec<Bytes>,
        finished: bool,
    }

    struct MockConnection {
        recorded: Arc<Mutex<Recorded>>,
        rows: u64,
    }

    impl MockConnection {
        fn reporting(rows: u64) -> Self {
            MockConnection {
                recorded: Arc::new(Mutex::new(Recorded::default())),
                rows,
            }
        }
    }

    struct MockSink {
        recorded: Arc<Mutex<Recorded>>,
        rows: u64,
    }

    #[async_trait::async_trait]
    impl CopySink for MockSink {
        async fn send(&mut self, chunk: Bytes) -> Result<(), BulkError> {
            self.recorded.lock().unwrap().chunks.push(chunk);
            Ok(())
        }

        async fn finish(self: Box<Self>) -> Result<u64, BulkError> {
            self.recorded.lock().unwrap().finished = true;
            Ok(self.rows)
        }
    }

    #[async_trait::async_trait]
    impl BulkConnection for MockConnection {
        async fn execute_ddl(&self, sql: &str) -> Result<(), BulkError> {
            self.recorded.lock().unwrap().ddl.push(sql.to_string());
            Ok(())
        }

        async fn open_copy(&self, sql: &str) -> Result<Box<dyn CopySink>, BulkError> {
            self.recorded.lock().unwrap().copy.push(sql.to_string());
            Ok(Box::new(MockSink {
                recorded: Arc::clone(&self.recorded),
                rows: self.rows,
            }))
        }
    }

    struct Keyed {
        id: i64,
    }

    impl BulkRecord for Keyed {
        fn type_name() -> &'static str {
            "Keyed"
        }
        fn field_specs() -> Vec<FieldSpec<Self>> {
            vec![FieldSpec::value(
                "id",
                vec![ScalarMapping {
                    column: "Id",
                    kind: PgKind::Int8,
                }],
                None,
                SourceKind::I64,
                |r: &Self| FieldValue::I64(r.id),
            )]
        }
    }

    // Declares I64 but yields I32: the compiled writer rejects the row.
    struct Mislabeled;

    impl BulkRecord for Mislabeled {
        fn type_name() -> &'static str {
            "Mislabeled"
        }
        fn field_specs() -> Vec<FieldSpec<Self>> {
            vec![FieldSpec::value(
                "id",
                vec![ScalarMapping {
                    column: "Id",
                    kind: PgKind::Int8,
                }],
                None,
                SourceKind::I64,
                |_: &Self| FieldValue::I32(0),
            )]
        }
    }

    #[tokio::test]
    async fn load_streams_header_rows_and_trailer() {
        let conn = MockConnection::reporting(2);
        let rows = load_records(&conn, "stage", vec![Keyed { id: 7 }, Keyed { id: 8 }])
            .await
            .unwrap();
        assert_eq!(rows, 2);

        let rec = conn.recorded.lock().unwrap();
        assert_eq!(
            rec.ddl,
            ["CREATE TEMP TABLE IF NOT EXISTS \"stage\" (\"Id\" bigint NULL)"]
        );
        assert_eq!(rec.copy, ["COPY \"stage\" (\"Id\") FROM STDIN (FORMAT BINARY)"]);
        assert!(rec.finished);

        let mut want = Vec::new();
        want.extend_from_slice(COPY_SIGNATURE);
        want.extend_from_slice(&0i32.to_be_bytes());
        want.extend_from_slice(&0i32.to_be_bytes());
        for id in [7i64, 8] {
            want.extend_from_slice(&1i16.to_be_bytes());
            want.extend_from_slice(&8i32.to_be_bytes());
            want.extend_from_slice(&id.to_be_bytes());
        }
        want.extend_from_slice(&(-1i16).to_be_bytes());
        let sent: Vec<u8> = rec.chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(sent, want);
    }

    #[tokio::test]
    async fn row_write_failure_leaves_copy_unfinished() {
        let conn = MockConnection::reporting(0);
        let err = load_records(&conn, "stage", vec![Mislabeled])
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::ValueShape { .. }));

        let rec = conn.recorded.lock().unwrap();
        assert!(!rec.finished);
        assert!(rec.chunks.is_empty());
    }

    #[tokio::test]
    async fn invalid_target_issues_no_statements() {
        let conn = MockConnection::reporting(0);
        let err = load_identifier_pairs(&conn, "a;drop", [EntityId::EMPTY])
            .await
            .unwrap_err();
        assert!(matches!(err, BulkError::InvalidTarget(_)));

        let rec = conn.recorded.lock().unwrap();
        assert!(rec.ddl.is_empty());
        assert!(rec.copy.is_empty());
    }

    #[tokio::test]
    async fn identifier_pairs_use_fixed_statements() {
        let conn = MockConnection::reporting(1);
        let rows = load_identifier_pairs(&conn, "ids", [EntityId::pair(EntityTag(1), 2, 100)])
            .await
            .unwrap();
        assert_eq!(rows, 1);

        let rec = conn.recorded.lock().unwrap();
        assert_eq!(
            rec.ddl,
            ["CREATE TEMP TABLE IF NOT EXISTS \"ids\" (\"ShardId\" smallint NULL, \"RecordId\" bigint NULL)"]
        );
        assert_eq!(
            rec.copy,
            ["COPY \"ids\" (\"ShardId\", \"RecordId\") FROM STDIN (FORMAT BINARY)"]
        );
        assert!(rec.finished);
    }

    #[test]
    fn empty_identifier_rows_are_all_null() {
        let mut buf = RowBuffer::bare();
        put_identifier(&mut buf, EntityId::EMPTY, true);
        let mut want = Vec::new();
        want.extend_from_slice(&3i16.to_be_bytes());
        for _ in 0..3 {
            want.extend_from_slice(&(-1i32).to_be_bytes());
        }
        assert_eq!(buf.as_slice(), &want[..]);
    }

    #[test]
    fn pair_row_layout() {
        let mut buf = RowBuffer::bare();
        put_identifier(&mut buf, EntityId::pair(EntityTag(1), 2, 100), false);
        let mut want = Vec::new();
        want.extend_from_slice(&2i16.to_be_bytes());
        want.extend_from_slice(&2i32.to_be_bytes());
        want.extend_from_slice(&2i16.to_be_bytes());
        want.extend_from_slice(&8i32.to_be_bytes());
        want.extend_from_slice(&100i64.to_be_bytes());
        assert_eq!(buf.as_slice(), &want[..]);
    }

    #[test]
    fn triple_without_child_writes_null_child() {
        let mut buf = RowBuffer::bare();
        put_identifier(&mut buf, EntityId::pair(EntityTag(1), 2, 100), true);
        let bytes = buf.as_slice();
        assert_eq!(&bytes[bytes.len() - 4..], &(-1i32).to_be_bytes()[..]);
    }
}
