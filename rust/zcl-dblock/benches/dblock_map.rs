// Insert/lookup throughput for the block map formats.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use zcl_dblock::{BlockOps, Kv, MapOpts, AVL16_MAP, LOG_MAP};

const BLK_SIZE: u32 = 64 * 1024;

fn populate(ops: &dyn BlockOps, block: &mut [u8], count: usize) {
    ops.init(block, &MapOpts { blk_size: BLK_SIZE });
    for i in 0..count {
        let key = format!("key-{:08}", (i * 2654435761usize) % 1_000_000);
        let value = format!("value-{i}");
        ops.insert(block, &Kv::new(key.as_bytes(), value.as_bytes()))
            .expect("block should have room");
    }
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("dblock-insert");
    for (name, ops) in [
        ("avl16", &AVL16_MAP as &dyn BlockOps),
        ("log", &LOG_MAP as &dyn BlockOps),
    ] {
        group.bench_function(name, |b| {
            let mut block = vec![0u8; BLK_SIZE as usize];
            b.iter(|| populate(ops, &mut block, 512));
        });
    }
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("dblock-lookup");
    for (name, ops) in [
        ("avl16", &AVL16_MAP as &dyn BlockOps),
        ("log", &LOG_MAP as &dyn BlockOps),
    ] {
        let mut block = vec![0u8; BLK_SIZE as usize];
        populate(ops, &mut block, 512);
        group.bench_function(name, |b| {
            b.iter(|| {
                for i in 0..512usize {
                    let key = format!("key-{:08}", (i * 2654435761usize) % 1_000_000);
                    black_box(ops.lookup(&block, key.as_bytes()));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup);
criterion_main!(benches);
