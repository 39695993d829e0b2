use std::cell::RefCell;
use std::rc::Rc;
use vireo_core::{
    fragment, h, static_content, HostNode, HostOps, Mutation, PatchFlags, RecordingHost, Renderer,
    VNode,
};
use vireo_scheduler::set_warn_handler;

fn setup() -> (Renderer<RecordingHost>, HostNode) {
    let renderer = Renderer::new(RecordingHost::new());
    let root = renderer.host().create_element("div");
    renderer.host().take_mutations();
    (renderer, root)
}

fn keyed_list(keys: &[&str]) -> VNode {
    h("ul")
        .children(keys.iter().map(|k| h("li").key(*k).text(*k)))
        .build()
}

fn mounted_el(renderer: &Renderer<RecordingHost>, root: HostNode) -> HostNode {
    renderer.root(root).and_then(|v| v.el()).unwrap()
}

fn count_moves(mutations: &[Mutation]) -> usize {
    mutations
        .iter()
        .filter(|m| matches!(m, Mutation::Move { .. }))
        .count()
}

#[test]
fn test_keyed_swap_moves_one_node() {
    let (renderer, root) = setup();
    renderer.render(Some(&keyed_list(&["a", "b", "c", "d"])), root);
    let ul = mounted_el(&renderer, root);
    let before = renderer.host().children(ul).unwrap();
    renderer.host().take_mutations();

    renderer.render(Some(&keyed_list(&["a", "c", "b", "d"])), root);

    assert_eq!(
        renderer.host().take_mutations(),
        vec![Mutation::Move {
            id: before[2].0,
            parent: ul.0,
            anchor: Some(before[1].0),
        }]
    );
    assert_eq!(
        renderer.host().children(ul).unwrap(),
        vec![before[0], before[2], before[1], before[3]]
    );
    assert_eq!(renderer.host().text_content(ul).unwrap(), "acbd");
}

#[test]
fn test_keyed_diff_only_moves_nodes_outside_increasing_run() {
    let (renderer, root) = setup();
    renderer.render(Some(&keyed_list(&["1", "2", "3", "4", "5"])), root);
    let ul = mounted_el(&renderer, root);
    let before = renderer.host().children(ul).unwrap();
    renderer.host().take_mutations();

    renderer.render(Some(&keyed_list(&["1", "3", "4", "2", "5"])), root);

    // 3 and 4 keep their relative order; only 2 travels, in front of 5.
    assert_eq!(
        renderer.host().take_mutations(),
        vec![Mutation::Move {
            id: before[1].0,
            parent: ul.0,
            anchor: Some(before[4].0),
        }]
    );
    assert_eq!(renderer.host().text_content(ul).unwrap(), "13425");
}

#[test]
fn test_keyed_reverse() {
    let (renderer, root) = setup();
    renderer.render(Some(&keyed_list(&["a", "b", "c", "d", "e"])), root);
    let ul = mounted_el(&renderer, root);
    let mut before = renderer.host().children(ul).unwrap();
    renderer.host().take_mutations();

    renderer.render(Some(&keyed_list(&["e", "d", "c", "b", "a"])), root);

    let mutations = renderer.host().take_mutations();
    assert_eq!(count_moves(&mutations), 4);
    assert_eq!(mutations.len(), 4);
    before.reverse();
    assert_eq!(renderer.host().children(ul).unwrap(), before);
}

#[test]
fn test_keyed_remove_from_middle() {
    let (renderer, root) = setup();
    renderer.render(Some(&keyed_list(&["a", "b", "c"])), root);
    let ul = mounted_el(&renderer, root);
    let before = renderer.host().children(ul).unwrap();
    renderer.host().take_mutations();

    renderer.render(Some(&keyed_list(&["a", "c"])), root);

    assert_eq!(
        renderer.host().take_mutations(),
        vec![Mutation::Remove { id: before[1].0 }]
    );
    assert_eq!(
        renderer.host().children(ul).unwrap(),
        vec![before[0], before[2]]
    );
}

#[test]
fn test_keyed_insert_in_middle_uses_next_sibling_as_anchor() {
    let (renderer, root) = setup();
    renderer.render(Some(&keyed_list(&["a", "c"])), root);
    let ul = mounted_el(&renderer, root);
    let before = renderer.host().children(ul).unwrap();
    renderer.host().take_mutations();

    renderer.render(Some(&keyed_list(&["a", "b", "c"])), root);

    let mutations = renderer.host().take_mutations();
    assert_eq!(mutations.len(), 3);
    assert!(matches!(&mutations[0], Mutation::CreateElement { tag, .. } if tag == "li"));
    assert!(matches!(&mutations[1], Mutation::SetElementText { value, .. } if value == "b"));
    assert!(matches!(
        &mutations[2],
        Mutation::Insert { parent, anchor: Some(anchor), .. }
            if *parent == ul.0 && *anchor == before[1].0
    ));
    assert_eq!(renderer.host().text_content(ul).unwrap(), "abc");
}

#[test]
fn test_keyed_mixed_create_remove_and_move() {
    let (renderer, root) = setup();
    renderer.render(Some(&keyed_list(&["a", "b", "c", "d"])), root);
    let ul = mounted_el(&renderer, root);
    let before = renderer.host().children(ul).unwrap();
    renderer.host().take_mutations();

    renderer.render(Some(&keyed_list(&["d", "x", "b"])), root);

    let mutations = renderer.host().take_mutations();
    let removed: Vec<u64> = mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::Remove { id } => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![before[0].0, before[2].0]);
    assert_eq!(count_moves(&mutations), 1);
    assert_eq!(renderer.host().text_content(ul).unwrap(), "dxb");

    let after = renderer.host().children(ul).unwrap();
    assert_eq!(after[0], before[3]);
    assert_eq!(after[2], before[1]);
}

#[test]
fn test_duplicate_keys_warn() {
    let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = warnings.clone();
    set_warn_handler(Some(Rc::new(move |msg: &str| {
        sink.borrow_mut().push(msg.to_string())
    })));

    let (renderer, root) = setup();
    renderer.render(Some(&keyed_list(&["a", "b"])), root);
    renderer.render(Some(&keyed_list(&["c", "c"])), root);

    assert!(warnings
        .borrow()
        .iter()
        .any(|w| w.contains("duplicate keys")));
    set_warn_handler(None);
}

#[test]
fn test_unkeyed_fragment_patches_by_position() {
    let (renderer, root) = setup();
    let list = |items: &[&str]| {
        h("ul")
            .patch_flag(PatchFlags::UNKEYED_FRAGMENT)
            .children(items.iter().copied())
            .build()
    };
    renderer.render(Some(&list(&["x", "y"])), root);
    let ul = mounted_el(&renderer, root);
    let before = renderer.host().children(ul).unwrap();
    renderer.host().take_mutations();

    renderer.render(Some(&list(&["x", "z", "w"])), root);

    let mutations = renderer.host().take_mutations();
    assert_eq!(
        mutations[0],
        Mutation::SetText {
            value: "z".into(),
            id: before[1].0,
        }
    );
    assert!(matches!(&mutations[1], Mutation::CreateTextNode { value, .. } if value == "w"));
    assert!(matches!(
        &mutations[2],
        Mutation::Insert { parent, anchor: None, .. } if *parent == ul.0
    ));
    assert_eq!(renderer.host().text_content(ul).unwrap(), "xzw");

    renderer.render(Some(&list(&["x"])), root);
    assert_eq!(renderer.host().children(ul).unwrap(), vec![before[0]]);
}

#[test]
fn test_fragment_children_stay_between_markers() {
    let (renderer, root) = setup();
    renderer.render(Some(&fragment(["a", "b"]).build()), root);
    assert_eq!(renderer.host().inner_html(root).unwrap(), "ab");
    // Start and end markers plus two children.
    assert_eq!(renderer.host().children(root).unwrap().len(), 4);

    renderer.render(Some(&fragment(["a", "c", "b"]).build()), root);
    assert_eq!(renderer.host().inner_html(root).unwrap(), "acb");

    renderer.render(None, root);
    assert!(renderer.host().children(root).unwrap().is_empty());
    assert_eq!(renderer.host().node_count(), 1);
}

#[test]
fn test_type_change_replaces_in_place() {
    let (renderer, root) = setup();
    renderer.render(
        Some(&h("div").children([h("p"), h("div"), h("p")]).build()),
        root,
    );
    renderer.render(
        Some(&h("div").children([h("p"), h("span"), h("p")]).build()),
        root,
    );
    assert_eq!(
        renderer.host().inner_html(root).unwrap(),
        "<div><p></p><span></span><p></p></div>"
    );

    renderer.render(Some(&h("section").build()), root);
    assert_eq!(
        renderer.host().inner_html(root).unwrap(),
        "<section></section>"
    );
    assert_eq!(renderer.host().node_count(), 2);
}

#[test]
fn test_text_and_list_children_transitions() {
    let (renderer, root) = setup();
    renderer.render(Some(&h("div").text("t").build()), root);
    assert_eq!(renderer.host().inner_html(root).unwrap(), "<div>t</div>");

    renderer.render(Some(&h("div").child(h("b")).build()), root);
    assert_eq!(
        renderer.host().inner_html(root).unwrap(),
        "<div><b></b></div>"
    );

    renderer.render(Some(&h("div").text("u").build()), root);
    assert_eq!(renderer.host().inner_html(root).unwrap(), "<div>u</div>");

    renderer.render(Some(&h("div").build()), root);
    assert_eq!(renderer.host().inner_html(root).unwrap(), "<div></div>");
}

#[test]
fn test_text_children_update_in_place() {
    let (renderer, root) = setup();
    renderer.render(Some(&h("p").text("hi").build()), root);
    let p = mounted_el(&renderer, root);
    renderer.host().take_mutations();

    renderer.render(Some(&h("p").text("bye").build()), root);
    assert_eq!(
        renderer.host().take_mutations(),
        vec![Mutation::SetElementText {
            value: "bye".into(),
            id: p.0,
        }]
    );

    renderer.render(Some(&h("p").text("bye").build()), root);
    assert!(renderer.host().take_mutations().is_empty());
}

#[test]
fn test_class_flag_only_patches_class() {
    let (renderer, root) = setup();
    let node = |class: &str, id: &str| {
        h("div")
            .prop("class", class)
            .prop("id", id)
            .patch_flag(PatchFlags::CLASS)
            .build()
    };
    renderer.render(Some(&node("a", "x")), root);
    let div = mounted_el(&renderer, root);
    renderer.host().take_mutations();

    renderer.render(Some(&node("b", "y")), root);

    assert_eq!(
        renderer.host().take_mutations(),
        vec![Mutation::SetAttribute {
            name: "class".into(),
            value: "b".into(),
            id: div.0,
        }]
    );
    assert_eq!(
        renderer.host().attribute(div, "id").unwrap().as_deref(),
        Some("x")
    );
}

#[test]
fn test_props_flag_only_patches_dynamic_props() {
    let (renderer, root) = setup();
    let node = |title: &str, id: &str| {
        h("div")
            .prop("title", title)
            .prop("id", id)
            .patch_flag(PatchFlags::PROPS)
            .dynamic_props(["title"])
            .build()
    };
    renderer.render(Some(&node("t1", "x")), root);
    let div = mounted_el(&renderer, root);
    renderer.host().take_mutations();

    renderer.render(Some(&node("t2", "y")), root);

    assert_eq!(
        renderer.host().take_mutations(),
        vec![Mutation::SetAttribute {
            name: "title".into(),
            value: "t2".into(),
            id: div.0,
        }]
    );
}

#[test]
fn test_full_diff_adds_changes_and_removes_props() {
    let (renderer, root) = setup();
    renderer.render(
        Some(&h("div").prop("id", "x").prop("hidden", true).build()),
        root,
    );
    let div = mounted_el(&renderer, root);
    renderer.host().take_mutations();

    renderer.render(
        Some(&h("div").prop("id", "y").prop("title", "t").build()),
        root,
    );

    let mutations = renderer.host().take_mutations();
    assert_eq!(mutations.len(), 3);
    assert!(mutations.contains(&Mutation::RemoveAttribute {
        name: "hidden".into(),
        id: div.0,
    }));
    assert_eq!(
        renderer.host().outer_html(div).unwrap(),
        "<div id=\"y\" title=\"t\"></div>"
    );
}

#[test]
fn test_hoisted_static_content_is_never_diffed() {
    let (renderer, root) = setup();
    renderer.render(Some(&static_content("<b>hi</b>")), root);
    assert_eq!(renderer.host().inner_html(root).unwrap(), "<b>hi</b>");
    renderer.host().take_mutations();

    renderer.render(Some(&static_content("<b>hi</b>")), root);
    assert!(renderer.host().take_mutations().is_empty());

    renderer.render(Some(&static_content("<i>new</i>")), root);
    assert_eq!(renderer.host().inner_html(root).unwrap(), "<i>new</i>");
}

#[test]
fn test_reused_static_node_is_cloned() {
    let renderer = Renderer::new(RecordingHost::new());
    let first = renderer.host().create_element("div");
    let second = renderer.host().create_element("div");
    let hoisted = static_content("<hr>");

    renderer.render(Some(&h("div").child(hoisted.clone()).build()), first);
    renderer.host().take_mutations();
    renderer.render(Some(&h("div").child(hoisted.clone()).build()), second);

    assert!(renderer
        .host()
        .take_mutations()
        .iter()
        .any(|m| matches!(m, Mutation::CloneNode { .. })));
    assert_eq!(
        renderer.host().inner_html(second).unwrap(),
        "<div><hr></div>"
    );
}

#[test]
fn test_repeated_child_gets_its_own_host_node() {
    let (renderer, root) = setup();
    let sep = h("hr").build();
    renderer.render(
        Some(&h("ul").children([sep.clone(), sep.clone()]).build()),
        root,
    );
    let ul = mounted_el(&renderer, root);
    let mounted = renderer.host().children(ul).unwrap();
    assert_eq!(mounted.len(), 2);
    assert_ne!(mounted[0], mounted[1]);

    renderer.render(
        Some(&h("ul").children([sep.clone(), sep.clone(), sep.clone()]).build()),
        root,
    );
    assert_eq!(renderer.host().inner_html(ul).unwrap(), "<hr></hr><hr></hr><hr></hr>");

    renderer.render(Some(&h("ul").build()), root);
    assert!(renderer.host().children(ul).unwrap().is_empty());
    assert_eq!(renderer.host().node_count(), 2);
}

#[test]
fn test_same_vnode_twice_is_a_no_op() {
    let (renderer, root) = setup();
    let tree = keyed_list(&["a", "b"]);
    renderer.render(Some(&tree), root);
    renderer.host().take_mutations();
    renderer.render(Some(&tree), root);
    assert!(renderer.host().take_mutations().is_empty());
}
