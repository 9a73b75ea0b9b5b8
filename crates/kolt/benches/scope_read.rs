//! Benchmarks comparing the native and interpreted scoped-read workloads.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use kolt::bench::scope_read;
use kolt::clock::TestClock;
use kolt::interpreter::Interpreter;
use kolt::parser::{
    Input as _, Parser as _, Spanned, Statement, Stream, Token, lexer, parser, resolve, span_at,
};
use std::io;

const BENCHMARK_SOURCE: &str = include_str!("../../../demos/benchmark_scope.kolt");

fn parse_benchmark(code: &str) -> Vec<Spanned<Statement<'_>>> {
    let mut tokens = lexer().parse(code).into_result().expect("lexing failed");
    tokens.retain(|token| !matches!(token.node, Token::Comment(_)));
    let statements = parser()
        .parse(tokens.map(span_at(code.len()), |Spanned { node, span }| (node, span)))
        .into_result()
        .expect("parsing failed");
    resolve(statements).expect("resolving failed").statements
}

/// The native realization: a million scoped reads per run
fn bench_native(c: &mut Criterion) {
    c.bench_function("scope_read_native", |b| {
        b.iter(|| {
            let mut clock = TestClock::new();
            let mut output = io::sink();
            scope_read(&mut clock, &mut output).expect("benchmark run failed");
        });
    });
}

/// The same workload through the tree-walking interpreter
fn bench_interpreted(c: &mut Criterion) {
    let program = parse_benchmark(BENCHMARK_SOURCE);

    let mut group = c.benchmark_group("scope_read_interpreted");
    // A full run is a million interpreted loop iterations; keep samples low
    group.sample_size(10);
    group.bench_function("run", |b| {
        b.iter(|| {
            let mut interpreter = Interpreter::with_host(TestClock::new(), io::empty(), io::sink());
            interpreter
                .interpret(&program, &[])
                .expect("benchmark run failed");
        });
    });
    group.finish();
}

/// Interpreter loop cost at varying iteration counts
fn bench_loop_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("interpreted_loop");

    for n in [1_000, 10_000, 100_000] {
        let source = format!("var i = 0\nwhile (i < {n}) {{\n    i += 1\n}}\n");
        let program = parse_benchmark(&source);

        group.bench_with_input(BenchmarkId::new("count_up", n), &n, |b, _| {
            b.iter(|| {
                let mut interpreter =
                    Interpreter::with_host(TestClock::new(), io::empty(), io::sink());
                interpreter
                    .interpret(&program, &[])
                    .expect("benchmark run failed");
            });
        });
    }

    group.finish();
}

/// Front-end cost alone: lex, parse and resolve the benchmark source
fn bench_parse(c: &mut Criterion) {
    c.bench_function("parse_and_resolve", |b| {
        b.iter(|| parse_benchmark(BENCHMARK_SOURCE));
    });
}

criterion_group!(
    benches,
    bench_native,
    bench_interpreted,
    bench_loop_scaling,
    bench_parse,
);
criterion_main!(benches);
