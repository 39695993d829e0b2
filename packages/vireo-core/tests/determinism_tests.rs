use vireo_core::{h, HostOps, Mutation, RecordingHost, Renderer, VNode};

fn tree(items: &[&str]) -> VNode {
    h("section")
        .prop("class", "list")
        .child(h("h1").text("Items"))
        .child(h("ul").children(items.iter().map(|k| h("li").key(*k).text(*k))))
        .build()
}

fn render_log(steps: &[&[&str]]) -> Vec<Mutation> {
    let renderer = Renderer::new(RecordingHost::new());
    let root = renderer.host().create_element("div");
    for items in steps {
        renderer.render(Some(&tree(items)), root);
    }
    renderer.host().take_mutations()
}

#[test]
fn test_deterministic_mutation_log() {
    let steps: &[&[&str]] = &[&["a", "b", "c"], &["c", "a", "d"], &["d"]];
    let first = serde_json::to_string(&render_log(steps)).unwrap();
    let second = serde_json::to_string(&render_log(steps)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_mutation_log_serializes() {
    let log = render_log(&[&["a"]]);
    let json = serde_json::to_value(&log).unwrap();

    assert_eq!(json[0]["CreateElement"]["tag"], "div");
    assert_eq!(json[1]["CreateElement"]["tag"], "section");
    assert!(log.iter().any(|m| matches!(
        m,
        Mutation::SetAttribute { name, value, .. } if name == "class" && value == "list"
    )));

    let decoded: Vec<Mutation> = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, log);
}
