// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 evdc contributors

//! Frame decoder hot path: a realistic mix of radio telegrams with noise.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use evdc::esp3::{Esp3Packet, FrameDecoder};

fn telegram_stream() -> Vec<u8> {
    let mut stream = Vec::new();
    for i in 0..64u32 {
        let mut packet = Esp3Packet::new();
        packet.init_for_rorg(if i % 3 == 0 { 0xF6 } else { 0xA5 }, 0);
        if i % 3 == 0 {
            packet.radio_user_data_mut()[0] = 0x30;
        } else {
            packet.set_fourbs_data(0x0100_0008 | (i << 16));
        }
        packet.set_radio_sender(0x0050_0000 + i);
        packet.finalize();
        stream.extend_from_slice(&packet.wire_bytes());
        if i % 7 == 0 {
            stream.extend_from_slice(&[0x00, 0x55, 0x13]);
        }
    }
    stream
}

fn bench_decode(c: &mut Criterion) {
    let stream = telegram_stream();
    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("mixed_stream", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut out = Vec::new();
            decoder.push_bytes(black_box(&stream), &mut out);
            black_box(out.len())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
