use criterion::{Criterion, black_box, criterion_group, criterion_main};
use lattsim_protocol::{Frame, FrameType};

fn frame_codec(c: &mut Criterion) {
    let mut connect_body = vec![0x04];
    connect_body.extend_from_slice(&[0xab; 64]);
    let connect = Frame::new(FrameType::Connect, 1, connect_body);

    let secure = Frame::new(FrameType::Secure, 2, vec![0x5a; 1024]);

    c.bench_function("encode_connect", |b| {
        b.iter(|| black_box(&connect).encode().unwrap())
    });

    let secure_bytes = secure.encode().unwrap();
    c.bench_function("decode_secure_1k", |b| {
        b.iter(|| Frame::decode(black_box(&secure_bytes)).unwrap())
    });
}

criterion_group!(benches, frame_codec);
criterion_main!(benches);
