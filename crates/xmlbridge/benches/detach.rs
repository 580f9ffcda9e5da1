//! Benchmarks for subtree detachment and document-pointer stripping.
//!
//! Run with: cargo bench -p xmlbridge

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use xmlbridge::detach::{self, Relation};
use xmlbridge::invalidate::strip_document_pointers;
use xmlbridge::{native, Heap, RecordPtr};

/// Document with a root holding `width` children, each with two
/// attributes and a grandchild that uses the root's namespace.
fn build_tree(heap: &Heap, width: usize) -> (RecordPtr, RecordPtr, Vec<RecordPtr>) {
    let doc = native::new_document(heap, false);
    let root = native::new_element(heap, Some(doc), "root").unwrap().unwrap();
    native::add_child(heap, doc, root).unwrap();
    let ns = native::new_namespace(heap, Some(root), "urn:bench", Some("b"))
        .unwrap()
        .unwrap();

    let mut children = Vec::with_capacity(width);
    for i in 0..width {
        let child = native::new_element(heap, Some(doc), &format!("c{i}")).unwrap().unwrap();
        native::set_attribute(heap, child, "id", &i.to_string()).unwrap();
        native::set_attribute(heap, child, "class", "item").unwrap();
        let leaf = native::new_element(heap, Some(doc), "leaf").unwrap().unwrap();
        native::set_namespace(heap, leaf, Some(ns)).unwrap();
        native::add_child(heap, child, leaf).unwrap();
        native::add_child(heap, root, child).unwrap();
        children.push(child);
    }
    (doc, root, children)
}

fn bench_detach_reattach(c: &mut Criterion) {
    let mut group = c.benchmark_group("detach_reattach");

    for width in [10, 100, 1_000] {
        let heap = Heap::new();
        let (_, root, children) = build_tree(&heap, width);

        group.bench_with_input(BenchmarkId::new("children", width), &width, |b, _| {
            b.iter(|| {
                for &child in &children {
                    detach::detach(&heap, Relation::Child, black_box(child), root).unwrap();
                    native::add_child(&heap, root, child).unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_strip(c: &mut Criterion) {
    let mut group = c.benchmark_group("strip_document_pointers");

    for width in [100, 1_000, 10_000] {
        let heap = Heap::new();
        let (doc, root, _) = build_tree(&heap, width);

        group.bench_with_input(BenchmarkId::new("subtree", width), &width, |b, _| {
            b.iter(|| {
                let cleared = strip_document_pointers(&heap, black_box(root)).unwrap();
                // Re-link restores every back-reference for the next pass
                detach::detach(&heap, Relation::Child, root, doc).unwrap();
                native::add_child(&heap, doc, root).unwrap();
                black_box(cleared)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_detach_reattach, bench_strip);
criterion_main!(benches);
