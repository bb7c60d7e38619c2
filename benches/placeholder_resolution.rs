//! Benchmark: Placeholder Resolution
//!
//! Measures command parsing and resolution against an ExecutorInput.
//! Run: cargo bench --bench placeholder_resolution

use std::collections::BTreeMap;

use camino::Utf8Path;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use kiln::binding::{parse_command, parse_template, ExecutorInput, ResolutionContext};
use kiln::{ComponentSpec, RuntimeValue};

/// Component with `size` string inputs and one output
fn generate_component(size: usize) -> ComponentSpec {
    let params: serde_json::Map<String, serde_json::Value> = (0..size)
        .map(|i| (format!("p{i}"), json!({"parameterType": "STRING"})))
        .collect();
    serde_json::from_value(json!({
        "inputDefinitions": {"parameters": params},
        "outputDefinitions": {"parameters": {"Output": {"parameterType": "STRING"}}},
        "executorLabel": "exec"
    }))
    .unwrap()
}

fn generate_inputs(size: usize) -> BTreeMap<String, RuntimeValue> {
    (0..size)
        .map(|i| (format!("p{i}"), RuntimeValue::Parameter(json!(format!("value-{i}")))))
        .collect()
}

/// One `--pI={{$.inputs.parameters['pI']}}` argument per input
fn generate_args(size: usize) -> Vec<kiln::ast::CommandArg> {
    let mut args: Vec<kiln::ast::CommandArg> = (0..size)
        .map(|i| format!("--p{i}={{{{$.inputs.parameters['p{i}']}}}}").as_str().into())
        .collect();
    args.push("{{$.outputs.parameters['Output'].output_file}}".into());
    args
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholder_parse");

    group.bench_function("plain_literal", |b| {
        b.iter(|| black_box(parse_template(black_box("--learning-rate=0.01"))))
    });
    group.bench_function("single_token", |b| {
        b.iter(|| black_box(parse_template(black_box("{{$.inputs.parameters['lr']}}"))))
    });

    for size in [1, 10, 50].iter() {
        let args = generate_args(*size);
        group.bench_with_input(BenchmarkId::new("command", size), &args, |b, args| {
            b.iter(|| black_box(parse_command(black_box(args))))
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholder_resolve");

    for size in [1, 10, 50].iter() {
        let component = generate_component(*size);
        let inputs = generate_inputs(*size);
        let executor_input =
            ExecutorInput::build(&component, &inputs, Utf8Path::new("/tmp/root/run/task"));
        let elements = parse_command(&generate_args(*size)).unwrap();
        let ctx = ResolutionContext {
            executor_input: &executor_input,
            pipeline_job_name: "bench-2024-01-01-00-00-00-000000",
            pipeline_job_uuid: "00000000-0000-0000-0000-000000000000",
            task_name: "task",
            task_uuid: "00000000-0000-0000-0000-000000000001",
            pipeline_root: "/tmp/root",
        };

        group.bench_with_input(BenchmarkId::new("command", size), &elements, |b, els| {
            b.iter(|| black_box(ctx.resolve_command(black_box(els))))
        });
    }

    group.finish();
}

fn bench_executor_input(c: &mut Criterion) {
    let component = generate_component(20);
    let inputs = generate_inputs(20);

    c.bench_function("executor_input_build_20", |b| {
        b.iter(|| {
            let ei = ExecutorInput::build(
                black_box(&component),
                black_box(&inputs),
                Utf8Path::new("/tmp/root/run/task"),
            );
            black_box(ei.to_json_string())
        })
    });
}

criterion_group!(benches, bench_parse, bench_resolve, bench_executor_input);
criterion_main!(benches);
