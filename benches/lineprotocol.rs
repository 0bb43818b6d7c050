//! Benchmarks for line protocol encoding and annotated CSV parsing.
//!
//! These run fully offline; no InfluxDB instance is required.
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use influxdb2_client::parser::AnnotatedCsvParser;
use influxdb2_client::{Point, WritePrecision};
use tokio::runtime::Runtime;

fn sample_point(i: usize) -> Point {
    Point::new("cpu")
        .tag("host", format!("server{:02}", i % 10))
        .tag("region", "us-east")
        .field("usage_user", i as f64 / 100.0)
        .field("usage_system", i as f64 / 200.0)
        .field("count", i as i64)
        .timestamp(1_700_000_000_000_000_000 + i as i64)
}

/// Benchmark encoding points to line protocol
fn bench_point_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_encoding");

    for size in [100usize, 10_000] {
        let points: Vec<Point> = (0..size).map(sample_point).collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("points", size), &points, |b, points| {
            b.iter(|| {
                let mut bytes = 0usize;
                for point in points {
                    bytes += point.to_line_protocol(WritePrecision::Ns).unwrap().len();
                }
                bytes
            });
        });
    }

    group.finish();
}

/// Build an annotated CSV response with one table and N records
fn annotated_csv(records: usize) -> String {
    let mut csv = String::from(
        "#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string\r\n\
         #group,false,false,true,true,false,false,true,true,true\r\n\
         #default,_result,,,,,,,,\r\n\
         ,result,table,_start,_stop,_time,_value,_field,_measurement,host\r\n",
    );
    for i in 0..records {
        csv.push_str(&format!(
            ",,0,2023-01-01T00:00:00Z,2023-12-31T00:00:00Z,2023-11-14T22:13:{:02}Z,{}.5,usage,cpu,server{:02}\r\n",
            i % 60,
            i % 100,
            i % 10
        ));
    }
    csv
}

/// Benchmark parsing annotated CSV from an in-memory buffer
fn bench_csv_parsing(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("csv_parsing");

    for size in [1_000usize, 50_000] {
        let csv = annotated_csv(size);

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("records", size), &csv, |b, csv| {
            b.to_async(&rt).iter(|| async {
                let mut parser = AnnotatedCsvParser::new(csv.as_bytes());
                let mut count = 0usize;
                while let Some(record) = parser.next().await.unwrap() {
                    let _ = record;
                    count += 1;
                }
                count
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_point_encoding, bench_csv_parsing);
criterion_main!(benches);
