//! Framing benchmark suite.
//!
//! Benchmarks the codec and a full request/response exchange:
//! - Payload sizes: 64 B, 4 KiB, 256 KiB
//! - Profiles: binary, text
//!
//! Run with: cargo bench --bench framing
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use duplex_transport::codec::{Assembled, Deframer, FrameAssembler, Framer};
use duplex_transport::interceptor::PacketEncoder;
use duplex_transport::protocol::WirePacket;
use duplex_transport::{
    FrameConfig, FrameProfile, Packet, RequestHandler, Result, SessionOptions,
    TransportSessionFactory,
};
use tokio::runtime::Runtime;

// ============================================================================
// Benchmark Parameters
// ============================================================================

const PAYLOAD_SIZES: &[usize] = &[64, 4 * 1024, 256 * 1024];
const PROFILES: &[FrameProfile] = &[FrameProfile::Binary, FrameProfile::Text];

fn wire_packet(size: usize) -> WirePacket {
    let payload: Vec<u8> = (0..size).map(|i| b'a' + (i % 26) as u8).collect();
    let packet = Packet::request("/bench")
        .with_id(1u16)
        .with_body(String::from_utf8(payload).expect("ascii"));
    PacketEncoder::encode(packet).expect("encode")
}

fn profile_name(profile: FrameProfile) -> &'static str {
    match profile {
        FrameProfile::Binary => "binary",
        FrameProfile::Text => "text",
    }
}

// ============================================================================
// Benchmark: Encode
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for &profile in PROFILES {
        let framer = Framer::new(FrameConfig::new(profile));
        for &size in PAYLOAD_SIZES {
            let packet = wire_packet(size);
            group.throughput(Throughput::Bytes(size as u64));
            group.bench_with_input(
                BenchmarkId::new(profile_name(profile), size),
                &packet,
                |b, packet| b.iter(|| framer.encode(black_box(packet)).expect("frame")),
            );
        }
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decode
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for &profile in PROFILES {
        let config = FrameConfig::new(profile);
        for &size in PAYLOAD_SIZES {
            let bytes = Framer::new(config)
                .encode(&wire_packet(size))
                .expect("frame")
                .concat();
            group.throughput(Throughput::Bytes(bytes.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(profile_name(profile), size),
                &bytes,
                |b, bytes| {
                    b.iter(|| {
                        let mut deframer = Deframer::new(&config);
                        let mut assembler = FrameAssembler::new(config);
                        deframer.push(black_box(bytes));
                        let mut packets = 0;
                        for frame in deframer.drain_frames().expect("deframe") {
                            if let Assembled::Packet(_) = assembler.push(frame).expect("assemble") {
                                packets += 1;
                            }
                        }
                        assert_eq!(packets, 1);
                    });
                },
            );
        }
    }

    group.finish();
}

// ============================================================================
// Benchmark: Round Trip
// ============================================================================

struct Echo;

#[async_trait]
impl RequestHandler for Echo {
    async fn handle(&self, request: Packet) -> Result<Option<Packet>> {
        Ok(Some(Packet::response_to(&request).with_body(request.body)))
    }
}

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let factory = TransportSessionFactory::new();

    let (client, _server) = rt.block_on(async {
        let (a, b) = tokio::io::duplex(1024 * 1024);
        let client = factory
            .create(a, "tcp", SessionOptions::new())
            .expect("client");
        let server = factory
            .create(b, "tcp", SessionOptions::server())
            .expect("server");
        server.set_request_handler(Arc::new(Echo));
        (client, server)
    });

    let mut group = c.benchmark_group("round_trip");
    for &size in PAYLOAD_SIZES {
        let body = "x".repeat(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("tcp", size), &body, |b, body| {
            b.to_async(&rt).iter(|| async {
                client
                    .request(Packet::request("/bench").with_body(body.as_str()))
                    .await
                    .expect("response")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode, bench_round_trip);
criterion_main!(benches);
