//! End-to-end staging scenario: two records, one with a null label and a
//! populated identifier, one with a label and an absent identifier, loaded
//! against an unqualified (session-temporary) target.

use pgbulk::cache::ArtifactCache;
use pgbulk::target::TargetName;
use pgbulk::{BulkRecord, EntityId, EntityTag, RowBuffer};

#[derive(BulkRecord)]
struct StagingRow {
    #[bulk(column = "Id", kind = "int4")]
    id: i32,
    #[bulk(column = "Label", kind = "text")]
    label: Option<String>,
    #[bulk(column = "ShardId", kind = "int2")]
    #[bulk(column = "RecordId", kind = "int4")]
    #[bulk(entity(shard = "ShardId", record = "RecordId"))]
    owner: EntityId,
}

#[test]
fn statements_for_unqualified_target() {
    let artifact = ArtifactCache::new().get_or_compile::<StagingRow>().unwrap();
    let target = TargetName::parse("staging").unwrap();
    let (create, copy) = target.materialize(&artifact.ddl_template, &artifact.copy_template);

    assert_eq!(
        create,
        "CREATE TEMP TABLE IF NOT EXISTS \"staging\" (\"Id\" integer NULL, \
         \"Label\" text NULL, \"ShardId\" smallint NULL, \"RecordId\" integer NULL)"
    );
    assert_eq!(
        copy,
        "COPY \"staging\" (\"Id\", \"Label\", \"ShardId\", \"RecordId\") \
         FROM STDIN (FORMAT BINARY)"
    );
}

#[test]
fn statements_for_qualified_target() {
    let artifact = ArtifactCache::new().get_or_compile::<StagingRow>().unwrap();
    let target = TargetName::parse("ingest.staging").unwrap();
    let (create, copy) = target.materialize(&artifact.ddl_template, &artifact.copy_template);
    assert!(create.starts_with("CREATE TABLE IF NOT EXISTS \"ingest\".\"staging\" ("));
    assert!(copy.starts_with("COPY \"ingest\".\"staging\" ("));
}

#[test]
fn two_record_stream_layout() {
    let artifact = ArtifactCache::new().get_or_compile::<StagingRow>().unwrap();
    let records = [
        StagingRow {
            id: 1,
            label: None,
            owner: EntityId::pair(EntityTag(1), 2, 100),
        },
        StagingRow {
            id: 2,
            label: Some("x".into()),
            owner: EntityId::EMPTY,
        },
    ];

    let mut buf = RowBuffer::bare();
    for record in &records {
        (artifact.row)(record, &mut buf).unwrap();
    }
    buf.finish();

    let mut want = Vec::new();
    // Row 1: Id=1, Label null, ShardId=2, RecordId=100.
    want.extend_from_slice(&4i16.to_be_bytes());
    want.extend_from_slice(&4i32.to_be_bytes());
    want.extend_from_slice(&1i32.to_be_bytes());
    want.extend_from_slice(&(-1i32).to_be_bytes());
    want.extend_from_slice(&2i32.to_be_bytes());
    want.extend_from_slice(&2i16.to_be_bytes());
    want.extend_from_slice(&4i32.to_be_bytes());
    want.extend_from_slice(&100i32.to_be_bytes());
    // Row 2: Id=2, Label="x", identifier parts null.
    want.extend_from_slice(&4i16.to_be_bytes());
    want.extend_from_slice(&4i32.to_be_bytes());
    want.extend_from_slice(&2i32.to_be_bytes());
    want.extend_from_slice(&1i32.to_be_bytes());
    want.push(b'x');
    want.extend_from_slice(&(-1i32).to_be_bytes());
    want.extend_from_slice(&(-1i32).to_be_bytes());
    // End-of-data trailer.
    want.extend_from_slice(&(-1i16).to_be_bytes());

    assert_eq!(buf.as_slice(), &want[..]);
}
