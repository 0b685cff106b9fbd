//! Criterion benchmarks for the consolidation merge and text index.

use criterion::{Criterion, criterion_group, criterion_main};
use gearstep_core::{
    ConsolidationPolicy, ProductId, Score, StrategyHit, StrategyKind, StrategyResult, TextIndex,
    UnitNormalizer, Weight, consolidate,
};
use std::hint::black_box;

fn hits(prefix: &str, count: u32, step: u32) -> Vec<StrategyHit> {
    (0..count)
        .map(|i| {
            StrategyHit::new(
                format!("P{}", i * step),
                format!("{prefix} {i}"),
                "Torch",
                Score::from_millionths(1_000_000 - i * 1_000),
            )
            .with_priority(i % 7)
        })
        .collect()
}

fn bench_consolidate_four_strategies(c: &mut Criterion) {
    let results = vec![
        StrategyResult::ok(StrategyKind::ExactMatch, hits("exact", 200, 1), 2),
        StrategyResult::ok(StrategyKind::Keyword, hits("keyword", 200, 2), 4),
        StrategyResult::ok(StrategyKind::Semantic, hits("semantic", 200, 3), 30),
        StrategyResult::ok(StrategyKind::Rerank, hits("rerank", 50, 5), 400),
    ];
    let policy = ConsolidationPolicy::new(20)
        .with_weight(StrategyKind::ExactMatch, Weight::UNIT)
        .with_weight(StrategyKind::Keyword, Weight::from_percent(50))
        .with_weight(StrategyKind::Semantic, Weight::from_percent(70))
        .with_weight(StrategyKind::Rerank, Weight::from_percent(120));

    c.bench_function("consolidate_4x200_hits", |bench| {
        bench.iter(|| consolidate(black_box(&results), black_box(&policy)));
    });

    let gated = policy.clone().gated(true);
    c.bench_function("consolidate_4x200_hits_gated", |bench| {
        bench.iter(|| consolidate(black_box(&results), black_box(&gated)));
    });
}

fn bench_keyword_search(c: &mut Criterion) {
    let normalizer = UnitNormalizer::new().expect("normalizer rules compile");
    let mut index = TextIndex::new();
    for i in 0..2_000u32 {
        let description = format!("MIG torch rated {} Amps, {} m cable", 200 + (i % 5) * 100, 3 + i % 4);
        index.add(
            &normalizer,
            &ProductId::new(format!("T{i}")),
            &format!("Torch {i}"),
            "Torch",
            &[description.as_str()],
        );
    }
    let query = normalizer.normalize("water cooled torch 500 ampères 4 meters");

    c.bench_function("keyword_search_2000_docs", |bench| {
        bench.iter(|| index.search("Torch", black_box(&query), 50));
    });
}

criterion_group!(benches, bench_consolidate_four_strategies, bench_keyword_search);
criterion_main!(benches);
