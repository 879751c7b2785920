//! Table insert and scan benchmarks.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use vellum_core::{Document, Value};
use vellum_db::{Database, TableConfig};
use vellum_kv::MemoryEngine;

fn bench_doc() -> Document {
    let mut doc = Document::new();
    for i in 0..10 {
        doc.set(format!("name-{}", i), Value::Integer(i));
    }
    doc
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_insert");
    for size in [1usize, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let doc = bench_doc();
            b.iter(|| {
                let db = Database::new(Arc::new(MemoryEngine::new()));
                db.update(|tx| {
                    tx.create_table(TableConfig::new("bench"))?;
                    let table = tx.get_table("bench")?;
                    for _ in 0..size {
                        table.insert(&doc)?;
                    }
                    Ok(())
                })
                .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("table_scan");
    for size in [1usize, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let db = Database::new(Arc::new(MemoryEngine::new()));
            let doc = bench_doc();
            db.update(|tx| {
                tx.create_table(TableConfig::new("bench"))?;
                let table = tx.get_table("bench")?;
                for _ in 0..size {
                    table.insert(&doc)?;
                }
                Ok(())
            })
            .unwrap();

            b.iter(|| {
                db.view(|tx| {
                    let table = tx.get_table("bench")?;
                    let mut count = 0;
                    table.iterate(|_, _| {
                        count += 1;
                        Ok(())
                    })?;
                    assert_eq!(count, size);
                    Ok(())
                })
                .unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_scan);
criterion_main!(benches);
