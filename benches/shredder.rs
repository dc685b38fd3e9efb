use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nestcol::schema::{bool, integer, optional_string, repeated_group, string, SchemaNode};
use nestcol::{Assembler, BundleFactory, Schema, SchemaBuilder, Striper, Value, ValueBuilder};

fn setup_flat_schema() -> (Schema, Value) {
    let schema = SchemaBuilder::new("flat", vec![])
        .field(string("name"))
        .field(integer("id"))
        .field(bool("active"))
        .build();

    let value = ValueBuilder::default()
        .field("name", "User")
        .field("id", 12345)
        .field("active", true)
        .build();

    (schema, value)
}

fn benchmark_flat_schema(c: &mut Criterion) {
    let (schema, value) = setup_flat_schema();
    let parsed = SchemaNode::parse(&schema).expect("schema should parse");
    let striper = Striper::new(&parsed);
    let mut buffer = striper.new_buffer();

    c.bench_function("flat_schema_shredder", |b| {
        b.iter(|| {
            striper.reset_buffer(&mut buffer);
            let ok = striper
                .stripe(black_box(&value), black_box(&mut buffer))
                .unwrap();
            black_box(ok);
        })
    });
}

fn setup_nested_schema() -> (Schema, Vec<Value>) {
    let schema = SchemaBuilder::new("Contact", vec![])
        .field(optional_string("name"))
        .field(repeated_group(
            "phones",
            vec![optional_string("number"), optional_string("phone_type")],
        ))
        .build();

    let values: Vec<Value> = vec![
        // Alice: has a name and two phones
        ValueBuilder::default()
            .field("name", "Alice")
            .repeated(
                "phones",
                vec![
                    ValueBuilder::default()
                        .field("number", "555-1234")
                        .field("phone_type", "Home")
                        .build(),
                    ValueBuilder::default()
                        .field("number", "555-5678")
                        .field("phone_type", "Work")
                        .build(),
                ],
            )
            .build(),
        // Bob: has only a name
        ValueBuilder::default().field("name", "Bob").build(),
        // Charlie: has a name and an empty list of phones
        ValueBuilder::default()
            .field("name", "Charlie")
            .repeated("phones", Vec::<Value>::new())
            .build(),
        // Diana: has a name and one phone
        ValueBuilder::default()
            .field("name", "Diana")
            .repeated(
                "phones",
                vec![ValueBuilder::default()
                    .field("number", "555-9999")
                    .field("phone_type", "Work")
                    .build()],
            )
            .build(),
        // _: has a phone but no name
        ValueBuilder::default()
            .repeated(
                "phones",
                vec![ValueBuilder::default()
                    .field("phone_type", "Mobile")
                    .build()],
            )
            .build(),
    ];

    (schema, values)
}

fn benchmark_nested_schema(c: &mut Criterion) {
    let (schema, values) = setup_nested_schema();
    let parsed = SchemaNode::parse(&schema).expect("schema should parse");
    let striper = Striper::new(&parsed);
    let mut buffer = striper.new_buffer();

    c.bench_function("nested_schema_shredder", |b| {
        b.iter(|| {
            for value in values.iter() {
                striper.reset_buffer(&mut buffer);
                let ok = striper
                    .stripe(black_box(value), black_box(&mut buffer))
                    .unwrap();
                black_box(ok);
            }
        })
    });
}

fn benchmark_nested_round_trip(c: &mut Criterion) {
    let (schema, values) = setup_nested_schema();
    let parsed = SchemaNode::parse(&schema).expect("schema should parse");
    let striper = Striper::new(&parsed);
    let assembler = Assembler::new(&parsed);
    let factory = BundleFactory::new(&parsed);

    c.bench_function("nested_schema_round_trip", |b| {
        b.iter(|| {
            let bundle = factory
                .stripe(black_box(&striper), black_box(&values))
                .unwrap();
            let records = bundle.assemble(black_box(&assembler)).unwrap();
            black_box(records);
        })
    });
}

criterion_group!(
    benchmark_shredder,
    benchmark_flat_schema,
    benchmark_nested_schema,
    benchmark_nested_round_trip
);
criterion_main!(benchmark_shredder);
