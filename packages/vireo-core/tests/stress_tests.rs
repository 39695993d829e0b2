use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;
use vireo_core::{h, h_component, Component, HostOps, Mutation, RecordingHost, Renderer, VNode};
use vireo_reactivity::{create_ref, Target, Value};
use vireo_scheduler::run_microtasks;

fn list(keys: &[usize]) -> VNode {
    h("ul")
        .children(keys.iter().map(|k| h("li").key(*k).text(k.to_string())))
        .build()
}

#[test]
fn test_stress_shuffle_large_keyed_list() {
    let renderer = Renderer::new(RecordingHost::new());
    let root = renderer.host().create_element("div");
    let keys: Vec<usize> = (0..1000).collect();
    renderer.render(Some(&list(&keys)), root);
    let ul = renderer.root(root).and_then(|v| v.el()).unwrap();
    let created = renderer.host().node_count();

    // Rotate by one: a single node travels to the end.
    let mut rotated = keys.clone();
    rotated.rotate_left(1);
    renderer.host().take_mutations();
    let start = Instant::now();
    renderer.render(Some(&list(&rotated)), root);
    let elapsed = start.elapsed();

    let mutations = renderer.host().take_mutations();
    assert_eq!(mutations.len(), 1);
    assert!(matches!(mutations[0], Mutation::Move { .. }));
    assert_eq!(renderer.host().node_count(), created);
    println!("rotated 1000 keyed rows in {elapsed:?}");

    // Interleave halves: half the rows stay, half move.
    let interleaved: Vec<usize> = (0..500).flat_map(|i| [i + 500, i]).collect();
    renderer.render(Some(&list(&interleaved)), root);
    let texts: Vec<String> = renderer
        .host()
        .children(ul)
        .unwrap()
        .into_iter()
        .map(|li| renderer.host().text_content(li).unwrap())
        .collect();
    let expected: Vec<String> = interleaved.iter().map(|k| k.to_string()).collect();
    assert_eq!(texts, expected);
}

#[test]
fn test_stress_many_updates_one_render() {
    let renderer = Renderer::new(RecordingHost::new());
    let root = renderer.host().create_element("div");
    let items = create_ref(Target::array(Vec::<Value>::new()));
    let renders = Rc::new(Cell::new(0));
    let comp = {
        let (items, renders) = (items.clone(), renders.clone());
        Component::new("Sum", move |_ctx| {
            let (items, renders) = (items.clone(), renders.clone());
            move || {
                renders.set(renders.get() + 1);
                let len = match items.get() {
                    Value::Proxy(p) => p.len(),
                    Value::Target(t) => t.raw_len(),
                    _ => 0,
                };
                h("output").text(len.to_string()).build()
            }
        })
    };
    renderer.render(Some(&h_component(&comp).build()), root);

    for i in 0..10_000 {
        items.set(Target::array((0..=i).map(Value::from)));
    }
    run_microtasks();

    assert_eq!(renders.get(), 2);
    assert_eq!(renderer.host().text_content(root).unwrap(), "10000");
}
