use criterion::{Criterion, black_box, criterion_group, criterion_main};
use haar_cascade::{
    CascadeModel, Detector, DetectorConfig, IntegralImageBuilder, MultiScaleSearch, PixelBuffer,
};

const CASCADE: &str = include_str!("../tests/data/synthetic_current.xml");

/// Noisy background with a few dark-over-bright blocks for the cascade to find
fn scene(width: usize, height: usize) -> Vec<u8> {
    let blocks = [(60usize, 40usize, 48usize), (300, 200, 96), (500, 80, 64)];
    let mut state = 7u32;
    let mut image = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let mut value = 115 + ((state >> 24) % 11) as u8;
            for &(bx, by, size) in &blocks {
                if x >= bx && x < bx + size && y >= by && y < by + size {
                    value = if y < by + size / 2 { 30 } else { 220 };
                }
            }
            image.push(value);
        }
    }
    image
}

fn bench_detect_640x480(c: &mut Criterion) {
    let model = CascadeModel::load(CASCADE).unwrap();
    let image = scene(640, 480);
    let pixels = PixelBuffer::new(&image, 640, 480).unwrap();
    let detector = Detector::new();
    c.bench_function("detect_640x480", |b| {
        b.iter(|| detector.detect(black_box(&model), black_box(&pixels)))
    });
}

fn bench_detect_coarse_640x480(c: &mut Criterion) {
    let model = CascadeModel::load(CASCADE).unwrap();
    let image = scene(640, 480);
    let pixels = PixelBuffer::new(&image, 640, 480).unwrap();
    let detector = Detector::with_config(
        DetectorConfig::default()
            .with_scale_factor(1.25)
            .with_min_size(32),
    );
    c.bench_function("detect_coarse_640x480", |b| {
        b.iter(|| detector.detect(black_box(&model), black_box(&pixels)))
    });
}

fn bench_search_only_640x480(c: &mut Criterion) {
    let model = CascadeModel::load(CASCADE).unwrap();
    let image = scene(640, 480);
    let pixels = PixelBuffer::new(&image, 640, 480).unwrap();
    let images = IntegralImageBuilder::build(&pixels).unwrap();
    let config = DetectorConfig::default().search;
    c.bench_function("search_only_640x480", |b| {
        b.iter(|| {
            let search = MultiScaleSearch::new(black_box(&model), &images, &config).unwrap();
            search.run()
        })
    });
}

criterion_group!(
    benches,
    bench_detect_640x480,
    bench_detect_coarse_640x480,
    bench_search_only_640x480
);
criterion_main!(benches);
