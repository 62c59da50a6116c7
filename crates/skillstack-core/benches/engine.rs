use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::collections::BTreeMap;

use skillstack_core::engine::{compile_rules, RuleEngine};
use skillstack_core::model::{FieldValue, Record, Rule};
use skillstack_core::predicate;

fn make_rules(n: usize) -> Vec<Rule> {
    (0..n)
        .map(|i| Rule {
            skill: format!("skill_{}", i % 8),
            expr: format!("feature_{i} >= {} & feature_{i} <= {}", i * 10, i * 10 + 100),
            weight: 10.0,
            decay: 0.5,
        })
        .collect()
}

fn make_record(n_fields: usize) -> Record {
    let fields: BTreeMap<String, FieldValue> = (0..n_fields)
        .map(|i| (format!("feature_{i}"), FieldValue::Int((i * 10 + 50) as i64)))
        .collect();
    Record::new("bench", fields)
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("predicate_compile");

    group.bench_function("simple", |b| {
        b.iter(|| predicate::compile(black_box("trecho_outro_genero_9 == 0")))
    });

    group.bench_function("legacy_conjunction", |b| {
        b.iter(|| {
            predicate::compile(black_box(
                "(vars.get('trecho_outro_genero_9') == 0) & (vars.get('num_pontuacao_eixo_2')>=120)",
            ))
        })
    });

    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_evaluate");

    for n_rules in [8usize, 64, 256] {
        let (compiled, _) = compile_rules(&make_rules(n_rules));
        let engine = RuleEngine::new(compiled);
        let record = make_record(n_rules);

        group.bench_function(format!("rules={n_rules}"), |b| {
            b.iter(|| engine.evaluate(black_box(&record)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_evaluate);
criterion_main!(benches);
