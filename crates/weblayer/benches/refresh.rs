//! Layer tree benchmarks.

use common::{Rect, Size};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dom::{BoxGeometry, DomTree, NodeId};
use parking_lot::RwLock;
use render::{MemoryLoader, SoftwareRasterizer};
use std::sync::Arc;
use weblayer::{DefaultTransition, LayerConfig, LayerTree, Ray, LAYER_ATTR};

/// A root with `count` marked children, each holding a few plain elements.
fn build_tree(count: usize) -> LayerTree {
    let mut dom = DomTree::with_body();
    let body = dom.body().unwrap();
    let root = dom.create_element("div");
    dom.append_child(body, root).unwrap();

    let geometry = Arc::new(BoxGeometry::new(Size::new(1920.0, 1080.0)));
    geometry.set_bounds(root, Rect::new(0.0, 0.0, 1920.0, 1080.0));

    for i in 0..count {
        let x = (i % 16) as f32 * 120.0;
        let y = (i / 16) as f32 * 120.0;
        let card: NodeId = dom.create_element("div");
        dom.set_attribute(card, LAYER_ATTR, "").unwrap();
        dom.append_child(root, card).unwrap();
        geometry.set_bounds(card, Rect::new(x, y, 100.0, 100.0));

        for j in 0..4 {
            let item = dom.create_element("p");
            dom.append_child(card, item).unwrap();
            geometry.set_bounds(item, Rect::new(x, y + j as f32 * 20.0, 100.0, 18.0));
        }
    }

    let backend = SoftwareRasterizer::new(geometry.clone(), Arc::new(MemoryLoader::new()));
    LayerTree::new(
        Arc::new(RwLock::new(dom)),
        geometry,
        Box::new(backend),
        LayerConfig::default(),
        root,
    )
    .unwrap()
}

/// Benchmark steady-state frame updates.
fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");

    for count in [16, 64, 256] {
        let mut tree = build_tree(count);
        let root = tree.root();
        tree.update(root, 1.0, &DefaultTransition).unwrap();
        tree.add_interaction_ray(Ray::toward_negative_z(0.05, -0.05, 1.0));

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                tree.update(black_box(root), 0.2, &DefaultTransition).unwrap();
            })
        });
    }

    group.finish();
}

/// Benchmark forced re-traversal of the whole tree.
fn bench_forced_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("forced_refresh");

    for count in [16, 64, 256] {
        let mut tree = build_tree(count);
        let root = tree.root();
        tree.update(root, 1.0, &DefaultTransition).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| tree.refresh(black_box(root), true).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_update, bench_forced_refresh);
criterion_main!(benches);
