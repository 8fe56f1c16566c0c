//! 桥接性能基准测试
//!
//! 编解码与同步分发的开销

use std::hint::black_box;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use script_bridge::scripting::thread_safe::ScriptHost;
use script_bridge::{Bridge, CallResponse, Codec};

struct NullHost;

impl ScriptHost for NullHost {
    fn execute_in_context(&mut self, code: &str) {
        black_box(code);
    }
}

// ============================================================================
// 编解码
// ============================================================================

fn bench_decode_inbound(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_inbound");

    let request = r#"{"seq":1,"function":"add","params":[2,3]}"#;
    let response = r#"{"seq":1,"result":{"items":[1,2,3],"name":"bench"},"present":true}"#;

    group.bench_function("request", |bencher| {
        bencher.iter(|| black_box(Codec::decode_inbound(black_box(request))))
    });
    group.bench_function("response", |bencher| {
        bencher.iter(|| black_box(Codec::decode_inbound(black_box(response))))
    });

    group.finish();
}

fn bench_script_string(c: &mut Criterion) {
    let mut group = c.benchmark_group("script_string");

    for size in [16usize, 256, 4096] {
        let text: String = "quote\" line\n "
            .chars()
            .cycle()
            .take(size)
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |bencher, text| {
            bencher.iter(|| black_box(Codec::script_string(text)))
        });
    }

    group.finish();
}

fn bench_encode_response(c: &mut Criterion) {
    let response = CallResponse::resolved(42, json!({"values": [1.5, 2.5, 3.5], "ok": true}));
    c.bench_function("encode_response", |bencher| {
        bencher.iter(|| black_box(Codec::encode_response(black_box(&response))))
    });
}

// ============================================================================
// 同步分发
// ============================================================================

fn bench_sync_dispatch(c: &mut Criterion) {
    let Ok(bridge) = Bridge::with_defaults() else {
        return;
    };
    if bridge.expose_sync("add", |a: i64, b: i64| a + b).is_err() {
        return;
    }
    let mut host = NullHost;
    bridge.on_context_created();
    bridge.context_queue().pump(&mut host);

    let message = r#"{"seq":1,"function":"add","params":[2,3]}"#;
    c.bench_function("sync_dispatch_add", |bencher| {
        bencher.iter(|| {
            bridge.on_inbound_message(black_box(message));
            bridge.context_queue().pump(&mut host)
        })
    });
}

criterion_group!(
    benches,
    bench_decode_inbound,
    bench_script_string,
    bench_encode_response,
    bench_sync_dispatch
);
criterion_main!(benches);
