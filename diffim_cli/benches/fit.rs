// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use diffim::config::{Config, KernelBasisSet};
use diffim::image::MaskedImage;
use diffim_cli::fit;

fn synthetic_pair(size: usize) -> (MaskedImage, MaskedImage) {
    let mut template = MaskedImage::new(size, size).unwrap();
    for y in 0..size {
        for x in 0..size {
            template.intensity.set(x, y, ((x + y) % 7) as f32 + 5.0);
        }
    }
    for by in (10..size.saturating_sub(10)).step_by(24) {
        for bx in (10..size.saturating_sub(10)).step_by(24) {
            for y in by..(by + 6).min(size) {
                for x in bx..(bx + 6).min(size) {
                    template.intensity.set(x, y, 80.0);
                }
            }
        }
    }
    let science = template.clone();
    (template, science)
}

fn fit_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sampling_mode(SamplingMode::Flat);

    let config = Config {
        kernel_cols: 7,
        kernel_rows: 7,
        kernel_basis_set: KernelBasisSet::DeltaFunction,
        use_pca_for_spatial_kernel: false,
        spatial_kernel_order: 1,
        spatial_bg_order: 1,
        fp_npix_min: 1,
        min_clean_fp: 1,
        n_star_per_cell: 10,
        constant_variance_weighting: true,
        ..Config::default()
    };

    for &size in &[64usize, 128, 256] {
        let (mut template, mut science) = synthetic_pair(size);
        group.throughput(criterion::Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| fit(&mut template, &mut science, 2, 2, &config).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    name = fit_bench;
    config = Criterion::default().sample_size(20);
    targets = fit_benches
);
criterion_main!(fit_bench);
