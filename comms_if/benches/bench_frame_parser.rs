//! # Frame Parser Benchmark

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use comms_if::{
    cmd::{ActuatorCommand, Direction},
    envelope,
    frame::{FrameEncoder, FrameParser},
};

fn frame_parser_benchmark(c: &mut Criterion) {
    // ---- Build a stream of frames with some noise between them ----

    let mut encoder = FrameEncoder::default();
    let mut stream = Vec::new();

    for i in 0..100 {
        let cmd = match i % 3 {
            0 => ActuatorCommand::TurnTo {
                degrees: i as f32 * 1.5,
            },
            1 => ActuatorCommand::Move {
                speed: i % 100,
                direction: Direction::Forward,
            },
            _ => ActuatorCommand::ResetGimbal,
        };

        if let Some(bytes) = encoder.encode(&cmd) {
            stream.extend_from_slice(&bytes);
        }
        stream.extend_from_slice(&[0x00, 0x42, 0x13]);
    }

    c.bench_function("FrameParser::feed_slice", |b| {
        b.iter(|| {
            let mut parser = FrameParser::new();
            parser.feed_slice(black_box(&stream))
        })
    });

    // ---- Compare against the JSON channel ----

    let text = envelope::encode(
        &ActuatorCommand::Init {
            speed: 50,
            degrees: 83.0,
        },
        envelope::CAR_PEER_ID,
    )
    .unwrap();

    c.bench_function("envelope::decode", |b| {
        b.iter(|| envelope::decode(black_box(&text)).unwrap())
    });
}

criterion_group!(benches, frame_parser_benchmark);
criterion_main!(benches);
