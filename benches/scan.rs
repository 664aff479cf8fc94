use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use lumbung::{Arg, Database, Mutation, Params, Query, TxnMode, Value};

fn populated_db(rows: i64) -> Database {
    let db = Database::open_in_memory().unwrap();
    db.run(&Mutation::create_table("items"), &Params::None)
        .unwrap();
    let mut txn = db.begin(TxnMode::ReadWrite).unwrap();
    for i in 0..rows {
        txn.run(
            &Mutation::insert(
                "items",
                vec![
                    Arg::Value(Value::Integer(i)),
                    Arg::Value(Value::Text(format!("item-{}", i))),
                ],
            ),
            &Params::None,
        )
        .unwrap();
    }
    txn.commit().unwrap();
    db
}

fn scan_benchmark(c: &mut Criterion) {
    let db = populated_db(1000);

    c.bench_function("sequential_scan_1000_rows", |b| {
        b.iter(|| {
            let rows = db.all(black_box(&Query::scan_all("items"))).unwrap();
            assert_eq!(rows.len(), 1000);
            rows
        })
    });

    c.bench_function("point_lookup_mid_table", |b| {
        b.iter(|| db.get(black_box(&Query::lookup("items", 500))).unwrap())
    });
}

criterion_group!(benches, scan_benchmark);
criterion_main!(benches);
