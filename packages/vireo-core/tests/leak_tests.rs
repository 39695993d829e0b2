use std::cell::Cell;
use std::rc::Rc;
use vireo_core::{h, h_component, watch, Component, HostOps, RecordingHost, Renderer, WatchOptions};
use vireo_reactivity::create_ref;
use vireo_scheduler::run_microtasks;

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[test]
fn test_unmounted_component_is_released() {
    let renderer = Renderer::new(RecordingHost::new());
    let root = renderer.host().create_element("div");
    let dropped = Rc::new(Cell::new(false));
    let state = create_ref(0);

    let comp = {
        let (dropped, state) = (dropped.clone(), state.clone());
        Component::new("Owner", move |_ctx| {
            let flag = DropFlag(dropped.clone());
            watch(&state, |_, _, _| {}, WatchOptions::default());
            let state = state.clone();
            move || {
                let _flag = &flag;
                h("p").text(state.get().to_string()).build()
            }
        })
    };
    renderer.render(Some(&h_component(&comp).build()), root);
    state.set(1);
    run_microtasks();
    assert!(!dropped.get());

    renderer.render(None, root);
    run_microtasks();
    assert!(dropped.get());
}

#[test]
fn test_repeated_mount_unmount_frees_host_nodes() {
    let renderer = Renderer::new(RecordingHost::new());
    let root = renderer.host().create_element("div");
    let comp = Component::new("Row", |_ctx| {
        || {
            h("tr")
                .children((0..5).map(|i| h("td").key(i).text(i.to_string())))
                .build()
        }
    });

    for _ in 0..100 {
        renderer.render(Some(&h_component(&comp).build()), root);
        renderer.render(None, root);
    }
    assert_eq!(renderer.host().node_count(), 1);
    assert!(renderer.root(root).is_none());
}

#[test]
fn test_stopped_watcher_drops_its_subscription() {
    let source = create_ref(0);
    let calls = Rc::new(Cell::new(0));
    let handle = {
        let calls = calls.clone();
        watch(
            &source,
            move |_, _, _| calls.set(calls.get() + 1),
            WatchOptions::default(),
        )
    };
    assert_eq!(handle.effect().dep_count(), 1);

    handle.stop();
    assert_eq!(handle.effect().dep_count(), 0);
    assert!(!handle.effect().is_active());
    source.set(1);
    run_microtasks();
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_insert_with_foreign_anchor_leaves_child_in_place() {
    let host = RecordingHost::new();
    let first = host.create_element("div");
    let second = host.create_element("div");
    let child = host.create_element("span");
    let stranger = host.create_element("b");
    host.insert(child, first, None);
    host.insert(stranger, first, None);
    host.take_mutations();

    host.insert(child, second, Some(stranger));

    assert!(host.take_mutations().is_empty());
    assert_eq!(host.parent_node(child), Some(first));
    assert_eq!(host.children(first).unwrap(), vec![child, stranger]);
    assert!(host.children(second).unwrap().is_empty());

    // Anchoring a node on itself keeps its slot.
    host.insert(child, first, Some(child));
    assert_eq!(host.children(first).unwrap(), vec![child, stranger]);
}
