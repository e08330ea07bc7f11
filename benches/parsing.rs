//! Benchmarks for the PEG engine and the grammar compiler
//!
//! Two workloads:
//! 1. Parsing - a small key/value grammar over growing inputs
//! 2. Compilation - emitting the JavaScript artifact for the same grammar
//!
//! Run with: cargo bench --bench parsing

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pegcore::compiler::{compile, CompileOptions};
use pegcore::parser_dsl::{lit, re, ref_, seq, GrammarBuilder};
use pegcore::Grammar;

fn build_grammar() -> Grammar {
    GrammarBuilder::new()
        .rule("File", ref_("Line").star())
        .rule(
            "Line",
            seq([re("[a-z_]+").text(), lit("="), re("[0-9]+").text(), lit("\n")]),
        )
        .build()
}

fn build_input(lines: usize) -> String {
    let mut input = String::new();
    for i in 0..lines {
        let key = (b'a' + (i % 10) as u8) as char;
        input.push_str(&format!("key_{}={}\n", key, i));
    }
    input
}

fn bench_parse(c: &mut Criterion) {
    let grammar = build_grammar();

    let mut group = c.benchmark_group("parse");
    for lines in [10usize, 100, 1000] {
        let input = build_input(lines);
        group.bench_function(format!("{}_lines", lines), |b| {
            b.iter(|| {
                let value = grammar.parse(black_box(&input)).unwrap();
                black_box(value)
            })
        });
    }
    group.finish();
}

fn bench_parse_failure(c: &mut Criterion) {
    let grammar = build_grammar();
    // Fails on the last line, after the whole prefix has been consumed.
    let mut input = build_input(100);
    input.push_str("key_a=oops\n");

    c.bench_function("parse_failure_100_lines", |b| {
        b.iter(|| {
            let err = grammar.parse(black_box(&input)).unwrap_err();
            black_box(err)
        })
    });
}

fn bench_compile(c: &mut Criterion) {
    let grammar = build_grammar();
    let options = CompileOptions::default();

    c.bench_function("compile_artifact", |b| {
        b.iter(|| {
            let artifact = compile(black_box(&grammar), &options).unwrap();
            black_box(artifact)
        })
    });
}

criterion_group!(benches, bench_parse, bench_parse_failure, bench_compile);
criterion_main!(benches);
