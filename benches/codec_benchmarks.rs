//! Codec benchmarks: encode/decode throughput for both text formats over a
//! synthetic sweep document.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sweepstore::codec::{JsonCodec, XmlCodec};
use sweepstore::value::{Map, Value};

fn sample_document(measurements: usize) -> Value {
    let mut rng = StdRng::seed_from_u64(42);
    let records: Vec<Value> = (0..measurements)
        .map(|i| {
            let mut info = Map::new();
            info.insert("measurement_id".to_string(), Value::Int(i as i64 + 1));
            info.insert(
                "start_date".to_string(),
                Value::Str("2024-03-01T10:00:00Z".to_string()),
            );
            let mut parameters = Map::new();
            parameters.insert("n".to_string(), Value::Int(rng.gen_range(1..64)));
            parameters.insert("coupling".to_string(), Value::Float(rng.gen()));
            let mut results = Map::new();
            results.insert(
                "energies".to_string(),
                Value::Seq((0..16).map(|_| Value::Float(rng.gen())).collect()),
            );
            let mut record = Map::new();
            record.insert("info".to_string(), Value::Map(info));
            record.insert("parameters".to_string(), Value::Map(parameters));
            record.insert("results".to_string(), Value::Map(results));
            Value::Map(record)
        })
        .collect();

    let mut doc = Map::new();
    doc.insert("measurements".to_string(), Value::Seq(records));
    Value::Map(doc)
}

fn bench_encode(c: &mut Criterion) {
    let document = sample_document(64);
    let xml = XmlCodec::new(Some("experiment"));
    let json = JsonCodec::new(Some("experiment"));

    c.bench_function("xml_encode_64_measurements", |b| {
        b.iter(|| xml.encode_to_string(black_box(&document)).unwrap());
    });
    c.bench_function("json_encode_64_measurements", |b| {
        b.iter(|| json.encode_to_string(black_box(&document)).unwrap());
    });
}

fn bench_decode(c: &mut Criterion) {
    let document = sample_document(64);
    let xml = XmlCodec::new(Some("experiment"));
    let json = JsonCodec::new(Some("experiment"));
    let xml_text = xml.encode_to_string(&document).unwrap();
    let json_text = json.encode_to_string(&document).unwrap();

    c.bench_function("xml_decode_64_measurements", |b| {
        b.iter(|| xml.decode_str(black_box(&xml_text)).unwrap());
    });
    c.bench_function("json_decode_64_measurements", |b| {
        b.iter(|| json.decode_str(black_box(&json_text)).unwrap());
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
