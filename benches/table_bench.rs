//! Benchmarks for larchkv table operations

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use larchkv::filter::{BloomFilter, Filter};
use larchkv::iterator::IteratorSeeker;
use larchkv::key::{InternalKey, KeyType};
use larchkv::session::SessionRecord;
use larchkv::storage::{FileDesc, StorageReader};
use larchkv::{Compression, Options, TableReader, TableWriter};

const ENTRIES: usize = 10_000;

fn entries() -> Vec<(Vec<u8>, Vec<u8>)> {
    (0..ENTRIES)
        .map(|i| {
            (
                format!("key{:08}", i).into_bytes(),
                format!("value{:08}-{}", i, "x".repeat(64)).into_bytes(),
            )
        })
        .collect()
}

fn options(compression: Compression) -> Options {
    Options::builder()
        .compression(compression)
        .filter(Arc::new(BloomFilter::new(10)))
        .build()
}

fn build_table(options: &Options, entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut writer = TableWriter::new(Vec::new(), options);
    for (k, v) in entries {
        writer.append(k, v).unwrap();
    }
    writer.close().unwrap();
    writer.into_inner()
}

fn open(data: Vec<u8>, options: &Options) -> TableReader {
    let size = data.len() as u64;
    let file: Arc<dyn StorageReader> = Arc::new(data);
    let pool = options.new_buffer_pool();
    TableReader::open(file, size, FileDesc::table(1), Some(pool), options).unwrap()
}

fn table_write(c: &mut Criterion) {
    let entries = entries();
    let mut group = c.benchmark_group("table_write");
    group.throughput(Throughput::Elements(ENTRIES as u64));

    for (name, compression) in [("none", Compression::None), ("snappy", Compression::Snappy)] {
        let options = options(compression);
        group.bench_function(name, |b| {
            b.iter(|| black_box(build_table(&options, &entries)))
        });
    }
    group.finish();
}

fn table_read(c: &mut Criterion) {
    let entries = entries();
    let options = options(Compression::Snappy);
    let table = open(build_table(&options, &entries), &options);

    let mut group = c.benchmark_group("table_read");
    group.bench_function("get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % ENTRIES;
            black_box(table.get(&entries[i].0).unwrap())
        })
    });
    group.bench_function("get_miss", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 7919) % ENTRIES;
            let key = format!("key{:08}x", i);
            black_box(table.get(key.as_bytes()).is_err())
        })
    });

    group.throughput(Throughput::Elements(ENTRIES as u64));
    group.bench_function("scan", |b| {
        b.iter(|| {
            let mut iter = table.iter(None);
            let mut n = 0;
            while iter.next() {
                n += 1;
            }
            black_box(n)
        })
    });
    group.finish();
}

fn bloom(c: &mut Criterion) {
    let bloom = BloomFilter::new(10);
    let keys: Vec<Vec<u8>> = (0..ENTRIES as u32).map(|i| i.to_le_bytes().to_vec()).collect();

    c.bench_function("bloom_build", |b| {
        b.iter(|| {
            let mut gen = bloom.new_generator();
            for key in &keys {
                gen.add(key);
            }
            let mut filter = Vec::new();
            gen.generate(&mut filter);
            black_box(filter)
        })
    });

    let mut gen = bloom.new_generator();
    for key in &keys {
        gen.add(key);
    }
    let mut filter = Vec::new();
    gen.generate(&mut filter);
    c.bench_function("bloom_contains", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            black_box(bloom.contains(&filter, &i.to_le_bytes()))
        })
    });
}

fn session_record(c: &mut Criterion) {
    let mut record = SessionRecord::new();
    record.set_comparer("leveldb.BytewiseComparator");
    record.set_journal_num(10);
    record.set_next_file_num(200);
    record.set_seq_num(1 << 40);
    for i in 0..100u64 {
        let smallest = InternalKey::new(format!("a{i:06}").as_bytes(), i, KeyType::Value);
        let largest = InternalKey::new(format!("z{i:06}").as_bytes(), i, KeyType::Value);
        record.add_table((i % 7) as usize, i, 2 << 20, smallest, largest);
    }
    let encoded = record.encode();

    c.bench_function("session_encode", |b| b.iter(|| black_box(record.encode())));
    c.bench_function("session_decode", |b| {
        b.iter_batched(
            || encoded.clone(),
            |data| black_box(SessionRecord::decode(&data).unwrap()),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, table_write, table_read, bloom, session_record);
criterion_main!(benches);
