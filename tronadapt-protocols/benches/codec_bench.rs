#[macro_use]
extern crate criterion;

use std::io::Cursor;
use std::time::Duration;

use bytes::BytesMut;
use criterion::{black_box, Criterion};

use tronadapt_protocols::socket_adapter::encode_action;
use tronadapt_protocols::{ClockCommand, InboundFrame};

// Input action on channel 3 carrying four parameters
const INPUT_FRAME: &[u8] = &[
    0x00, 0x00, 0x00, 0x03, // Channel id
    0x00, 0x04, // Parameter count
    0x00, 0x00, 0x00, 0x01, //
    0x00, 0x00, 0x00, 0x02, //
    0x00, 0x00, 0x00, 0x03, //
    0x00, 0x00, 0x00, 0x04, //
];

fn benchmark_clock_encoding(c: &mut Criterion) {
    let cmd = ClockCommand::Delay {
        cond: 4,
        mutex: 2,
        delay: Duration::from_millis(1_500),
    };
    let mut buf = BytesMut::with_capacity(32);

    c.bench_function("clock_delay_encoding", |b| {
        b.iter(|| {
            buf.clear();
            black_box(cmd).encode(&mut buf).unwrap();
        })
    });
}

fn benchmark_action_encoding(c: &mut Criterion) {
    let params = [7, 9, 11, 13];
    let mut buf = BytesMut::with_capacity(32);

    c.bench_function("action_encoding", |b| {
        b.iter(|| {
            buf.clear();
            encode_action(black_box(5), black_box(&params), &mut buf).unwrap();
        })
    });
}

fn benchmark_frame_decoding(c: &mut Criterion) {
    c.bench_function("input_frame_decoding", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(INPUT_FRAME));
            black_box(InboundFrame::read_from(&mut cursor)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    benchmark_clock_encoding,
    benchmark_action_encoding,
    benchmark_frame_decoding
);
criterion_main!(benches);
