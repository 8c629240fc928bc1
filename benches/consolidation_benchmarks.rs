//! Benchmarks for page consolidation and reading order.
//!
//! Pages are synthetic: a grid of detections per column with a share of
//! vertically stacked fragments and overlapping boxes, which is what a
//! layout model produces on dense scientific pages.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use pdf_catalog::catalog::{BlockRole, PageInfo};
use pdf_catalog::config::{IngestConfig, Profile, ReadingOrderKind};
use pdf_catalog::consolidate::Consolidator;
use pdf_catalog::geometry::BBox;
use pdf_catalog::ids::IdManager;
use pdf_catalog::layout::{LabelMap, RawRegion};
use pdf_catalog::pipeline::reading_order::{create_strategy, OrderItem, ReadingOrderContext, ReadingOrderStrategy};

const PAGE_W: f32 = 1240.0;
const PAGE_H: f32 = 1754.0;

// =============================================================================
// Page generators
// =============================================================================

/// `n` detections spread over two columns.
///
/// Every third box sits 10px below its predecessor (a fragment to merge),
/// every fifth is a near-duplicate of its predecessor.
fn generate_detections(n: usize) -> Vec<RawRegion> {
    const LABELS: [&str; 4] = ["Text", "Text", "List", "Title"];
    let mut raw = Vec::with_capacity(n);
    let mut y = [60.0f32; 2];

    for i in 0..n {
        let column = i % 2;
        let x1 = if column == 0 { 60.0 } else { 640.0 };
        let height = 40.0 + (i % 7) as f32 * 10.0;
        let gap = if i % 3 == 0 { 10.0 } else { 40.0 };
        let y1 = y[column] % (PAGE_H - 200.0);
        let bbox = BBox::new(x1, y1, x1 + 540.0, y1 + height);
        raw.push(RawRegion::new(bbox, LABELS[i % LABELS.len()], 0.5 + (i % 5) as f32 * 0.1));

        if i % 5 == 0 {
            raw.push(RawRegion::new(
                BBox::new(bbox.x1 + 4.0, bbox.y1 + 2.0, bbox.x2 - 4.0, bbox.y2 + 2.0),
                "Text",
                0.4,
            ));
        }
        y[column] = y1 + height + gap;
    }
    raw
}

fn generate_items(n: usize) -> Vec<OrderItem> {
    generate_detections(n)
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let role = if i % 11 == 0 { BlockRole::Separator } else { BlockRole::Text };
            OrderItem::new(r.bbox, role)
        })
        .collect()
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_consolidate(c: &mut Criterion) {
    let mut group = c.benchmark_group("consolidate");
    let config = Profile::Scientific.create_config();
    let consolidator = Consolidator::new(&config, LabelMap::for_profile(Profile::Scientific));
    let page = PageInfo::from_points(0, PAGE_W, PAGE_H, 72);

    for n in [10, 50, 200] {
        let raw = generate_detections(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &raw, |b, raw| {
            b.iter(|| {
                let mut ids = IdManager::new();
                black_box(consolidator.consolidate(&page, black_box(raw), &mut ids))
            })
        });
    }
    group.finish();
}

fn bench_consolidate_without_padding(c: &mut Criterion) {
    let config = IngestConfig::default().with_box_padding(0.0);
    let consolidator = Consolidator::new(&config, LabelMap::for_profile(Profile::Scientific));
    let page = PageInfo::from_points(0, PAGE_W, PAGE_H, 72);
    let raw = generate_detections(200);

    c.bench_function("consolidate_no_padding_200", |b| {
        b.iter(|| {
            let mut ids = IdManager::new();
            black_box(consolidator.consolidate(&page, black_box(&raw), &mut ids))
        })
    });
}

fn bench_reading_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("reading_order");
    let context = ReadingOrderContext::new().with_size(PAGE_W, PAGE_H);

    for kind in [ReadingOrderKind::TwoColumn, ReadingOrderKind::SingleColumn] {
        let strategy = create_strategy(kind);
        for n in [10, 100, 500] {
            let items = generate_items(n);
            group.bench_with_input(BenchmarkId::new(strategy.name(), n), &items, |b, items| {
                b.iter(|| black_box(strategy.apply(black_box(items), &context)))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_consolidate, bench_consolidate_without_padding, bench_reading_order);
criterion_main!(benches);
