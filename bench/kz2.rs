use criterion::{black_box, criterion_group, criterion_main, Criterion};

use gc_disparity::{prelude::*, graph::Graph, kz2::{Kz2, Params}};
use image::{DynamicImage, GrayImage, Luma};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn texture(x: u32, y: u32) -> u8 {
    let h = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263);
    (h.wrapping_mul(1_274_126_177) >> 24) as u8
}

fn kz2_bench(c: &mut Criterion) {
    // Build frame, the scene sits at disparity -5
    let frame = StereoFrame::new(
        DynamicImage::ImageLuma8(GrayImage::from_fn(WIDTH, HEIGHT, |x, y| Luma([texture(x, y)]))),
        DynamicImage::ImageLuma8(GrayImage::from_fn(WIDTH, HEIGHT, |x, y| Luma([texture(x + 5, y)])))
    );

    // Build disparity alg
    let mut disp = Kz2::new(Params {
        min_disparity: -8,
        max_disparity: 0,
        ..Params::default()
    });

    // Benchmark compute function
    c.bench_function("kz2 synthetic 64x48", |b| b.iter(|| disp.compute(black_box(&frame))));
}

fn max_flow_bench(c: &mut Criterion) {
    const SIDE: usize = 100;

    c.bench_function("max flow grid 100x100", |b| {
        b.iter(|| {
            let mut g = Graph::with_capacity(SIDE * SIDE, 2 * SIDE * SIDE);
            let nodes: Vec<_> = (0..SIDE * SIDE).map(|_| g.add_node()).collect();

            for (i, &n) in nodes.iter().enumerate() {
                let (x, y) = (i % SIDE, i / SIDE);
                let w = i32::from(texture(x as u32, y as u32));
                g.add_terminal_weights(n, w, 255 - w);
                if x + 1 < SIDE {
                    g.add_edge(n, nodes[i + 1], 40, 40);
                }
                if y + 1 < SIDE {
                    g.add_edge(n, nodes[i + SIDE], 40, 40);
                }
            }

            black_box(g.max_flow())
        })
    });
}

criterion_group!(benches, kz2_bench, max_flow_bench);
criterion_main!(benches);
