use criterion::{black_box, criterion_group, criterion_main, Criterion};
use evio::writer::write_events_to_vec;
use evio::{CompactReader, DataType, EvioEvent, EvioStructure, WriterOptions};

fn sample_file(events: usize, ints: usize) -> Vec<u8> {
    let evs: Vec<EvioEvent> = (0..events)
        .map(|i| {
            let mut ev = EvioEvent::new(1, DataType::Bank, i as i32);
            for tag in 0..8u16 {
                let mut b = EvioStructure::bank(tag, DataType::Int32, 0);
                b.set_ints(&vec![i as i32; ints]).unwrap();
                ev.add_child(b).unwrap();
            }
            ev.set_all_header_lengths().unwrap();
            ev
        })
        .collect();
    write_events_to_vec(&evs, WriterOptions::default()).unwrap()
}

fn bench_index(c: &mut Criterion) {
    let buf = sample_file(1000, 256);

    c.bench_function("walk_blocks_1000_events", |b| {
        b.iter(|| CompactReader::new(black_box(buf.clone())).unwrap())
    });

    c.bench_function("scan_and_search_1000_events", |b| {
        b.iter(|| {
            let mut reader = CompactReader::new(buf.clone()).unwrap();
            let mut hits = 0;
            for n in 1..=reader.event_count() {
                hits += reader.search_event(n, 5, 0).unwrap().len();
            }
            black_box(hits)
        })
    });
}

fn bench_materialize(c: &mut Criterion) {
    let buf = sample_file(200, 4096);
    let reader = CompactReader::new(buf).unwrap();

    c.bench_function("parse_all_200_events", |b| {
        b.iter(|| black_box(reader.parse_all_events().unwrap()))
    });
}

criterion_group!(benches, bench_index, bench_materialize);
criterion_main!(benches);
