use criterion::{Criterion, black_box, criterion_group, criterion_main};
use vireo_core::{HostOps, RecordingHost, Renderer, VNode, h};

fn rows(keys: &[usize]) -> VNode {
    h("tbody")
        .children(keys.iter().map(|k| h("tr").key(*k).text(k.to_string())))
        .build()
}

fn benchmark_keyed_diff(c: &mut Criterion) {
    let forward: Vec<usize> = (0..1000).collect();
    let mut swapped = forward.clone();
    swapped.swap(1, 998);
    let reversed: Vec<usize> = forward.iter().rev().copied().collect();

    for (name, next) in [
        ("keyed diff 1000 swap rows", &swapped),
        ("keyed diff 1000 reverse", &reversed),
    ] {
        c.bench_function(name, |b| {
            let renderer = Renderer::new(RecordingHost::new());
            let root = renderer.host().create_element("table");
            b.iter(|| {
                renderer.render(Some(&rows(&forward)), root);
                renderer.render(Some(&rows(black_box(next))), root);
                renderer.host().take_mutations();
            })
        });
    }
}

fn benchmark_mount(c: &mut Criterion) {
    let keys: Vec<usize> = (0..1000).collect();
    c.bench_function("mount and unmount 1000 rows", |b| {
        let renderer = Renderer::new(RecordingHost::new());
        let root = renderer.host().create_element("table");
        b.iter(|| {
            renderer.render(Some(&rows(black_box(&keys))), root);
            renderer.render(None, root);
            renderer.host().take_mutations();
        })
    });
}

criterion_group!(benches, benchmark_keyed_diff, benchmark_mount);
criterion_main!(benches);
