//! Codec benchmarks for muster-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use muster_protocol::{codec, Encoding, Frame, GatewayEvent};
use serde_json::json;

fn member_list_frame(members: u32) -> Frame {
    let items: Vec<_> = (0..members)
        .map(|i| {
            json!({"member": {
                "user": {"id": (1000 + i).to_string(), "username": format!("user{i}")},
                "roles": ["1", "2"]
            }})
        })
        .collect();

    Frame::dispatch(
        "GUILD_MEMBER_LIST_UPDATE",
        1,
        json!({
            "guild_id": "1",
            "member_count": members,
            "groups": [{"id": "online", "count": members}],
            "ops": [{"op": "SYNC", "range": [0, 99], "items": items}]
        }),
    )
}

fn bench_decode_member_list(c: &mut Criterion) {
    let frame = member_list_frame(100);

    let mut group = c.benchmark_group("decode_member_list");
    for encoding in [Encoding::Json, Encoding::Msgpack] {
        let encoded = codec::encode(&frame, encoding).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_function(encoding.as_str(), |b| {
            b.iter(|| {
                let frame = codec::decode(black_box(&encoded), encoding).unwrap();
                GatewayEvent::from_frame(frame).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_encode_member_list(c: &mut Criterion) {
    let frame = member_list_frame(100);

    c.bench_function("encode_member_list_json", |b| {
        b.iter(|| codec::encode(black_box(&frame), Encoding::Json))
    });
}

criterion_group!(benches, bench_decode_member_list, bench_encode_member_list);
criterion_main!(benches);
