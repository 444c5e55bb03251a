// SPDX-License-Identifier: MPL-2.0
use criterion::{criterion_group, criterion_main, Criterion};
use image_rs::{DynamicImage, Rgb, RgbImage};
use pixel_magic::infrastructure::onnx::{rmbg, super_resolution};
use pixel_magic::media::tensor;
use std::hint::black_box;

fn gradient(width: u32, height: u32) -> DynamicImage {
    // Coordinates are reduced modulo 256 before the cast
    #[allow(clippy::cast_possible_truncation)]
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(image)
}

fn preprocessing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let photo = gradient(1280, 853);

    group.bench_function("rmbg_input_1280x853", |b| {
        b.iter(|| black_box(rmbg::preprocess(black_box(&photo)).ok()));
    });

    group.bench_function("super_resolution_condition_1280x853", |b| {
        b.iter(|| black_box(super_resolution::prepare_condition(black_box(&photo))));
    });

    let mask = ndarray::Array2::from_shape_fn((1024, 1024), |(y, x)| ((x + y) % 7) as f32);
    group.bench_function("rmbg_mask_to_1280x853", |b| {
        b.iter(|| black_box(rmbg::postprocess(black_box(mask.view()), 1280, 853)));
    });

    group.finish();
}

fn resize_benchmark(c: &mut Criterion) {
    let chw = tensor::image_to_chw(&gradient(640, 480));

    c.bench_function("resize_bilinear_640x480_to_1024", |b| {
        b.iter(|| black_box(tensor::resize_bilinear(black_box(chw.view()), 1024, 1024)));
    });
}

criterion_group!(benches, preprocessing_benchmark, resize_benchmark);
criterion_main!(benches);
