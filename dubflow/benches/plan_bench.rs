//! Benchmarks for execution planning over a large synthetic series.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dubflow::core::{Language, StageId};
use dubflow::pipeline::Planner;
use dubflow::store::ArtifactStore;
use dubflow::testing::TestSeries;
use tempfile::TempDir;

const EPISODES: u32 = 200;

/// Seeds a three-language series with every text stage satisfied.
fn seeded_series(root: &std::path::Path) -> TestSeries {
    let series = TestSeries::at_with(root, |b| {
        b.languages([Language::Korean, Language::Japanese, Language::Taiwanese])
    });
    series.seed_metadata(Language::Korean);

    let contents: Vec<(u32, String)> = (1..=EPISODES)
        .map(|n| (n, format!("제{n}화 본문입니다. ").repeat(40)))
        .collect();
    let episodes: Vec<(u32, &str, &str)> = contents
        .iter()
        .map(|(n, content)| (*n, "", content.as_str()))
        .collect();

    series.seed_split(&episodes);
    for language in [Language::Korean, Language::Japanese, Language::Taiwanese] {
        for stage in [
            StageId::Translate,
            StageId::TtsFormat,
            StageId::SpeakerTagging,
            StageId::EmotionTagging,
        ] {
            series.seed_stage(stage, Some(language), &episodes);
        }
    }
    series
}

fn plan_benchmark(c: &mut Criterion) {
    let tmp = TempDir::new().expect("bench fixture dir");
    let series = seeded_series(tmp.path());

    // Warm store: descriptors come from the probe cache after the first plan.
    c.bench_function("plan_warm_store", |b| {
        b.iter(|| black_box(Planner::plan(&series.config, &series.store)))
    });

    // Cold store: every cell is probed from the filesystem again.
    c.bench_function("plan_cold_store", |b| {
        b.iter(|| {
            let store = ArtifactStore::open(series.paths.series_dir.clone());
            black_box(Planner::plan(&series.config, &store))
        })
    });
}

criterion_group!(benches, plan_benchmark);
criterion_main!(benches);
