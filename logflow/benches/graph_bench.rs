//! Benchmarks for graph validation and building.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use logflow::config::ConfigRegistry;
use logflow::graph::PluginConfigGraph;
use logflow::plugin::BuildContext;
use serde_json::{json, Value};
use std::sync::Arc;

fn noop_chain(len: usize) -> Vec<Value> {
    (0..len)
        .map(|i| {
            if i + 1 == len {
                json!({"id": format!("p{i}"), "type": "drop_output"})
            } else {
                json!({"id": format!("p{i}"), "type": "noop", "output": format!("p{}", i + 1)})
            }
        })
        .collect()
}

fn graph_benchmark(c: &mut Criterion) {
    let registry = Arc::new(ConfigRegistry::with_builtins().unwrap());
    let ctx = BuildContext::with_registry(Arc::clone(&registry));
    let raws = noop_chain(100);

    c.bench_function("decode_and_validate_100", |b| {
        b.iter(|| {
            let configs = registry.decode_all(black_box(raws.clone())).unwrap();
            PluginConfigGraph::new(configs).unwrap()
        })
    });

    c.bench_function("build_100", |b| {
        b.iter(|| {
            let configs = registry.decode_all(raws.clone()).unwrap();
            let graph = PluginConfigGraph::new(configs).unwrap();
            black_box(graph.build(&ctx).unwrap())
        })
    });
}

criterion_group!(benches, graph_benchmark);
criterion_main!(benches);
