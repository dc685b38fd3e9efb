//! End-to-end pipeline tests: records through the background writer into
//! an in-memory sink, decoded back through the plain codecs, and
//! reassembled by the reader.

use nestcol::error::Error;
use nestcol::schema::{integer, optional_string, repeated_group, repeated_string, string, SchemaNode};
use nestcol::sink::MemorySink;
use nestcol::testing::{column_feeds, PlainCodecFactory};
use nestcol::{
    Query, Reader, ReaderOptions, SchemaBuilder, Value, ValueBuilder, Writer, WriterOptions,
};
use std::sync::Arc;

fn sample_schema() -> SchemaNode {
    let schema = SchemaBuilder::new("event", vec![])
        .field(integer("id"))
        .field(optional_string("source"))
        .field(repeated_group(
            "measurements",
            vec![string("unit"), integer("value")],
        ))
        .field(repeated_string("tags"))
        .build();
    SchemaNode::parse(&schema).expect("schema should parse")
}

fn sample_record(i: i64) -> Value {
    let mut builder = ValueBuilder::default().field("id", i);
    if i % 3 != 0 {
        builder = builder.field("source", format!("sensor-{}", i % 5));
    }
    builder = builder.repeated(
        "measurements",
        (0..(i % 4))
            .map(|m| {
                ValueBuilder::default()
                    .field("unit", if m % 2 == 0 { "ms" } else { "bytes" })
                    .field("value", i * 10 + m)
                    .build()
            })
            .collect::<Vec<_>>(),
    );
    if i % 2 == 0 {
        builder = builder.repeated("tags", vec![format!("t{}", i)]);
    }
    builder.build()
}

/// What a written record looks like after a round trip: absent fields
/// surface as typed nulls, empty collections as null.
fn normal_form(i: i64) -> Value {
    let mut builder = ValueBuilder::default().field("id", i);
    builder = if i % 3 != 0 {
        builder.field("source", format!("sensor-{}", i % 5))
    } else {
        builder.string("source", None)
    };
    builder = if i % 4 != 0 {
        builder.repeated(
            "measurements",
            (0..(i % 4))
                .map(|m| {
                    ValueBuilder::default()
                        .field("unit", if m % 2 == 0 { "ms" } else { "bytes" })
                        .field("value", i * 10 + m)
                        .build()
                })
                .collect::<Vec<_>>(),
        )
    } else {
        builder.field("measurements", Value::Null)
    };
    builder = if i % 2 == 0 {
        builder.repeated("tags", vec![format!("t{}", i)])
    } else {
        builder.field("tags", Value::Null)
    };
    builder.build()
}

fn write_records(
    schema: &SchemaNode,
    n: i64,
    options: WriterOptions,
) -> (nestcol::writer::WriterStats, MemorySink) {
    let mut writer = Writer::new(schema, Arc::new(PlainCodecFactory), MemorySink::new(), options);
    for i in 0..n {
        writer.write(sample_record(i)).expect("write failed");
    }
    writer.close().expect("close failed")
}

#[test]
fn test_write_then_read_everything() {
    let schema = sample_schema();
    let (stats, sink) = write_records(&schema, 500, WriterOptions::default().bundle_size(64));

    assert_eq!(stats.records_written, 500);
    assert_eq!(stats.records_dropped, 0);
    assert_eq!(stats.record_groups, 1);
    assert_eq!(sink.groups().len(), 1);
    assert_eq!(sink.groups()[0].num_records, 500);

    let options = ReaderOptions::default().bundle_size(64);
    let projection = Reader::projection(&schema, &Query::all(), &options).unwrap();
    let feeds = column_feeds(sink.groups(), &projection).unwrap();
    let records = Reader::new(&projection, feeds, &options)
        .unwrap()
        .read_all()
        .unwrap();

    assert_eq!(records.len(), 500);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record, &normal_form(i as i64), "record {i} diverged");
    }
}

#[test]
fn test_record_groups_flush_on_size() {
    let schema = sample_schema();
    // A tiny record-group threshold forces multiple flushes.
    let (stats, sink) = write_records(
        &schema,
        300,
        WriterOptions::default()
            .bundle_size(32)
            .record_group_length(2 * 1024),
    );

    assert!(
        stats.record_groups >= 2,
        "expected multiple record groups, got {}",
        stats.record_groups
    );
    assert_eq!(sink.groups().len(), stats.record_groups as usize);
    let total: usize = sink.groups().iter().map(|group| group.num_records).sum();
    assert_eq!(total, 300);

    // Groups concatenate transparently on the read side.
    let options = ReaderOptions::default();
    let projection = Reader::projection(&schema, &Query::all(), &options).unwrap();
    let feeds = column_feeds(sink.groups(), &projection).unwrap();
    let records = Reader::new(&projection, feeds, &options)
        .unwrap()
        .read_all()
        .unwrap();
    assert_eq!(records.len(), 300);
    assert_eq!(records[299], normal_form(299));
}

#[test]
fn test_projected_read_from_sink() {
    let schema = sample_schema();
    let (_, sink) = write_records(&schema, 100, WriterOptions::default().bundle_size(16));

    let options = ReaderOptions::default();
    let query = Query::record([
        ("id", Query::all()),
        (
            "measurements",
            Query::element(Query::record([("value", Query::all())])),
        ),
    ]);
    let projection = Reader::projection(&schema, &query, &options).unwrap();
    assert_eq!(projection.num_columns(), 2);

    let feeds = column_feeds(sink.groups(), &projection).unwrap();
    let records = Reader::new(&projection, feeds, &options)
        .unwrap()
        .read_all()
        .unwrap();

    assert_eq!(records.len(), 100);
    // Record 5 has one measurement (5 % 4 == 1) valued 50.
    assert_eq!(
        records[5],
        ValueBuilder::default()
            .field("id", 5)
            .repeated(
                "measurements",
                vec![ValueBuilder::default().field("value", 50).build()],
            )
            .build()
    );
    // Record 4 has none (4 % 4 == 0).
    assert_eq!(
        records[4],
        ValueBuilder::default()
            .field("id", 4)
            .field("measurements", Value::Null)
            .build()
    );
}

#[test]
fn test_error_handler_drops_bad_records() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let schema = sample_schema();
    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_in_handler = Arc::clone(&dropped);
    let options = WriterOptions::default()
        .bundle_size(8)
        .error_handler(Box::new(move |_, _| {
            dropped_in_handler.fetch_add(1, Ordering::SeqCst);
        }));

    let mut writer = Writer::new(&schema, Arc::new(PlainCodecFactory), MemorySink::new(), options);
    for i in 0..40 {
        let record = if i % 10 == 9 {
            // Wrong type for id.
            ValueBuilder::default().field("id", "oops").build()
        } else {
            sample_record(i)
        };
        writer.write(record).expect("write failed");
    }
    let (stats, sink) = writer.close().expect("close failed");

    assert_eq!(stats.records_written, 36);
    assert_eq!(stats.records_dropped, 4);
    assert_eq!(dropped.load(Ordering::SeqCst), 4);

    let options = ReaderOptions::default();
    let projection = Reader::projection(&schema, &Query::all(), &options).unwrap();
    let feeds = column_feeds(sink.groups(), &projection).unwrap();
    let records = Reader::new(&projection, feeds, &options)
        .unwrap()
        .read_all()
        .unwrap();
    assert_eq!(records.len(), 36);
}

#[test]
fn test_stripe_failure_surfaces_on_write_or_close() {
    let schema = sample_schema();
    let mut writer = Writer::new(
        &schema,
        Arc::new(PlainCodecFactory),
        MemorySink::new(),
        WriterOptions::default().bundle_size(1),
    );

    // No error handler: the bad record fails its batch in the background.
    writer
        .write(ValueBuilder::default().field("id", "oops").build())
        .expect("the failure is asynchronous");

    // The failure must surface on a subsequent call.
    let mut failed = false;
    for i in 0..1000 {
        if writer.write(sample_record(i)).is_err() {
            failed = true;
            break;
        }
    }
    if !failed {
        assert!(matches!(writer.close(), Err(Error::Stripe(_))));
    }
}

#[test]
fn test_reader_chunks_preserve_order_across_window() {
    let schema = sample_schema();
    let (_, sink) = write_records(&schema, 256, WriterOptions::default().bundle_size(16));

    let options = ReaderOptions::default().bundle_size(4);
    let projection = Reader::projection(&schema, &Query::all(), &options).unwrap();
    let feeds = column_feeds(sink.groups(), &projection).unwrap();
    let reader = Reader::new(&projection, feeds, &options).unwrap();

    // 64 chunks of 4 records, far more than the in-flight window; order
    // must still be exact.
    let mut seen = 0i64;
    for chunk in reader.chunks() {
        for record in chunk.unwrap() {
            assert_eq!(record, normal_form(seen));
            seen += 1;
        }
    }
    assert_eq!(seen, 256);
}
