//! Pipeline performance benchmarks.
//!
//! Measures stage application and re-indexing over synthetic data sets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use propcurate::curation::{
    ConvertToExcessMolarVolume, DataSet, FilterByNComponents, FilterByTemperature,
    FilterDuplicates, SelectPerSubstance,
};
use propcurate::model::{Component, PropertyRecord, PropertyType, Substance, ThermodynamicState};
use propcurate::{CurationPipeline, Reindexer, StageConfig};

/// Component identifiers with their molar masses.
const COMPONENTS: &[(&str, f64)] = &[
    ("O", 18.015),
    ("CCO", 46.069),
    ("CO", 32.042),
    ("CC(C)O", 60.096),
    ("CC(=O)C", 58.080),
];

const TEMPERATURES: &[f64] = &[288.15, 298.15, 308.15, 318.15];

/// Pure and binary densities at every temperature, `copies` times over.
fn synthetic(copies: usize) -> DataSet {
    let mut records = Vec::new();

    for copy in 0..copies {
        for &temperature in TEMPERATURES {
            let state = ThermodynamicState::new(temperature, 101.325);

            for (i, (a, _)) in COMPONENTS.iter().enumerate() {
                records.push((
                    format!("{}-{}-{}", a, temperature, copy),
                    PropertyRecord::new(Substance::pure(*a).unwrap(), state, PropertyType::Density, 0.9),
                ));

                for (b, _) in &COMPONENTS[i + 1..] {
                    let mixture = Substance::new([
                        Component::fraction(*a, 0.5),
                        Component::fraction(*b, 0.5),
                    ])
                    .unwrap();
                    records.push((
                        format!("{}+{}-{}-{}", a, b, temperature, copy),
                        PropertyRecord::new(mixture, state, PropertyType::Density, 0.85),
                    ));
                }
            }
        }
    }

    DataSet::ingest(records)
}

fn converter() -> ConvertToExcessMolarVolume {
    COMPONENTS
        .iter()
        .fold(ConvertToExcessMolarVolume::default(), |c, (id, mass)| {
            c.with_molar_mass(*id, *mass)
        })
}

/// Benchmark individual stages.
fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("stages");
    let pipeline = CurationPipeline::new();
    let input = synthetic(10);

    let stages = [
        (
            "filter_by_temperature",
            StageConfig::from(FilterByTemperature {
                minimum: Some(290.0),
                maximum: Some(310.0),
            }),
        ),
        ("filter_by_n_components", StageConfig::from(FilterByNComponents::exactly(2))),
        ("filter_duplicates", StageConfig::from(FilterDuplicates::default())),
        ("select_per_substance", StageConfig::from(SelectPerSubstance::new(1))),
        ("convert_excess_molar_volume", StageConfig::from(converter())),
    ];

    for (name, stage) in &stages {
        group.bench_function(*name, |b| {
            b.iter(|| black_box(pipeline.apply_stage(&input, stage).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark a full workflow with varying input sizes.
fn bench_pipeline_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_scaling");
    let pipeline = CurationPipeline::new();
    let stages = [
        StageConfig::from(FilterDuplicates::default()),
        StageConfig::from(converter()),
        StageConfig::from(SelectPerSubstance::new(1).with_per_state(true)),
    ];

    for copies in [1, 10, 50].iter() {
        let input = synthetic(*copies);

        group.bench_with_input(BenchmarkId::new("curate", input.len()), &input, |b, input| {
            b.iter(|| black_box(pipeline.curate(input.clone(), &stages).unwrap()))
        });
    }

    group.finish();
}

/// Benchmark re-indexing.
fn bench_reindex(c: &mut Criterion) {
    let input = synthetic(10);
    let reindexer = Reindexer::new();

    c.bench_function("reindex", |b| b.iter(|| black_box(reindexer.index(&input))));
}

criterion_group!(benches, bench_stages, bench_pipeline_scaling, bench_reindex);
criterion_main!(benches);
