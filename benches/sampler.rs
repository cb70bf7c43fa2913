use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use mgsa::simulate::SimulatedSetting;
use mgsa::{Associations, DoubleParam, MgsaCalculation, TermId};

fn associations(items: u32, terms: u32) -> Associations {
    let mut associations = Associations::new();
    for item in 0..items {
        let gene = format!("gene{item}");
        associations.add_total(gene.as_str(), TermId::from(item % terms + 1));
        associations.add_total(gene.as_str(), TermId::from(item % 7 + terms + 1));
        if item % 5 == 0 {
            associations.add_total(gene.as_str(), TermId::from(item % 3 + terms + 10));
        }
    }
    associations
}

fn calculation(seed: u64) -> MgsaCalculation {
    let mut calculation = MgsaCalculation::default();
    calculation
        .set_seed(seed)
        .set_mcmc_steps(50_000)
        .set_burn_in(5_000)
        .set_take_population_as_reference(true);
    calculation
}

fn sampler_benchmark(c: &mut Criterion) {
    let associations = associations(5000, 200);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let setting = SimulatedSetting::create(
        &mut rng,
        &[(TermId::from(3u32), 0.2), (TermId::from(205u32), 0.2)],
        0.02,
        &associations,
    );

    c.bench_function("sampled params 50k steps", |b| {
        b.iter(|| {
            calculation(7)
                .calculate_study_set(
                    black_box(&associations),
                    &setting.population,
                    &setting.study,
                )
                .unwrap()
        })
    });

    c.bench_function("integrated params 50k steps", |b| {
        b.iter(|| {
            calculation(7)
                .set_integrate_params(true)
                .calculate_study_set(
                    black_box(&associations),
                    &setting.population,
                    &setting.study,
                )
                .unwrap()
        })
    });

    c.bench_function("fixed params 50k steps", |b| {
        b.iter(|| {
            calculation(7)
                .set_alpha(DoubleParam::fixed(0.02))
                .set_beta(DoubleParam::fixed(0.2))
                .set_expected_number_of_terms(DoubleParam::fixed(2.0))
                .calculate_study_set(
                    black_box(&associations),
                    &setting.population,
                    &setting.study,
                )
                .unwrap()
        })
    });

    c.bench_function("4 parallel chains", |b| {
        b.iter(|| {
            (1..=4u64)
                .into_par_iter()
                .map(|seed| {
                    calculation(seed)
                        .calculate_study_set(&associations, &setting.population, &setting.study)
                        .unwrap()
                        .len()
                })
                .sum::<usize>()
        })
    });
}

criterion_group!(sampler, sampler_benchmark);
criterion_main!(sampler);
