use expect_test::expect;

use crate::{Attributes, Literal, Name, NodeBuilder, Path, Reference, Tag, TagLog, Value, assemble, print};

fn open(ty: &str) -> Tag {
    Tag::Open { ty: Name::from(ty), attributes: Attributes::new() }
}

fn close(ty: &str) -> Tag {
    Tag::Close { ty: Name::from(ty), attributes: Attributes::new() }
}

fn reference(name: &str, index: Option<u32>) -> Tag {
    Tag::Reference(Path::new(name, index))
}

fn literal(ty: &str, text: &str) -> Tag {
    Tag::Literal(Literal::new(ty, text))
}

/// Tags of `[1, 2]` with every digit wrapped in a `Digit` node.
fn array() -> Vec<Tag> {
    vec![
        open("Array"),
        literal("Punctuator", "["),
        reference("elements", Some(0)),
        open("Digit"),
        reference("value", None),
        literal("Digit", "1"),
        close("Digit"),
        literal("Punctuator", ","),
        literal("Whitespace", " "),
        reference("elements", Some(1)),
        open("Digit"),
        reference("value", None),
        literal("Digit", "2"),
        close("Digit"),
        literal("Punctuator", "]"),
        close("Array"),
    ]
}

#[test]
fn assembled_tree_prints_its_source() {
    let node = assemble(array()).unwrap();
    assert_eq!(print(&node), "[1, 2]");
    assert_eq!(node.to_string(), "[1, 2]");

    expect![[r#"
        Array
          Punctuator "["
          elements.0: Digit
            value: Digit "1"
          Punctuator ","
          Whitespace " "
          elements.1: Digit
            value: Digit "2"
          Punctuator "]"
    "#]]
    .assert_eq(&node.debug_tree());
}

#[test]
fn children_and_literals_keep_source_order() {
    let node = assemble(array()).unwrap();
    let paths: Vec<String> = node.children().map(|(path, _)| path.to_string()).collect();
    assert_eq!(paths, ["elements.0", "elements.1"]);
    let literals: Vec<&str> = node.literals().map(Literal::text).collect();
    assert_eq!(literals, ["[", ",", " ", "]"]);
    let second = node.get(&Path::new("elements", Some(1))).and_then(|child| child.as_node()).unwrap();
    assert_eq!(second.to_string(), "2");
}

#[test]
fn out_of_order_ordinals_are_rejected() {
    let mut tags = array();
    tags[9] = reference("elements", Some(2));
    let error = assemble(tags).unwrap_err();
    expect!["malformed tag stream: reference `elements.2` out of order, expected `elements.1`"]
        .assert_eq(&error.to_string());
}

#[test]
fn unbalanced_streams_are_rejected() {
    let mut tags = array();
    tags.pop();
    assert!(assemble(tags.clone()).is_err());
    assert!(TagLog::new(tags).is_err());

    let dangling = vec![open("Array"), reference("elements", Some(0)), close("Array")];
    assert!(assemble(dangling).is_err());
}

#[test]
fn attributes_on_close_tags_are_bound() {
    let tags = vec![
        open("Array"),
        literal("Punctuator", "[]"),
        Tag::Close {
            ty: Name::from("Array"),
            attributes: [(Name::from("empty"), Value::Bool(true))].into_iter().collect(),
        },
    ];
    let node = assemble(tags).unwrap();
    assert_eq!(node.attribute("empty"), Some(&Value::Bool(true)));
}

#[test]
fn tag_log_pairs_and_neighbours() {
    let log = TagLog::new(array()).unwrap();
    assert_eq!(log.pair(0), Some(15));
    assert_eq!(log.pair(15), Some(0));
    assert_eq!(log.pair(3), Some(6));
    assert_eq!(log.pair(1), None);
    assert_eq!(log.prev(0), None);
    assert_eq!(log.next(14), Some(15));
    assert_eq!(log.next(15), None);
    assert_eq!(log.text(), "[1, 2]");
}

#[test]
fn with_attribute_leaves_the_original_alone() {
    let node = assemble(array()).unwrap();
    let marked = node.with_attribute("checked", true);
    assert_eq!(node.attribute("checked"), None);
    assert_eq!(marked.attribute("checked"), Some(&Value::Bool(true)));
    assert_eq!(print(&marked), print(&node));
}

#[test]
fn abstract_tree_drops_unreferenced_literals() {
    let node = assemble(array()).unwrap().to_abstract();
    assert_eq!(print(&node), "12");
    assert_eq!(node.literals().count(), 0);
}

#[test]
fn deep_trees_are_walked_without_recursion() {
    const DEPTH: usize = 100_000;
    let inner = Reference::parse("inner");
    let mut node = NodeBuilder::new("Leaf");
    node.push_child(&Reference::parse("value"), Literal::new("Letter", "x")).unwrap();
    let mut node = node.finish();
    for _ in 0..DEPTH {
        let mut builder = NodeBuilder::new("Wrap");
        builder.push_literal(Literal::new("Punctuator", "("));
        builder.push_child(&inner, node).unwrap();
        builder.push_literal(Literal::new("Punctuator", ")"));
        node = builder.finish();
    }
    let text = print(&node);
    assert_eq!(text.len(), 2 * DEPTH + 1);
    assert!(text.starts_with("((") && text.ends_with("))"));
    assert_eq!(node.debug_tree().lines().count(), 3 * DEPTH + 2);

    let stripped = node.to_abstract();
    assert_eq!(print(&stripped), "x");
    drop(node);
    drop(stripped);
}

#[test]
fn builder_uses_resolver_ordinals() {
    let mut builder = NodeBuilder::new("List");
    let items = Reference::parse("items[]");
    let first = builder.push_child(&items, Literal::new("Item", "a")).unwrap();
    let second = builder.push_child(&items, Literal::new("Item", "b")).unwrap();
    assert_eq!((first.to_string(), second.to_string()), ("items.0".to_owned(), "items.1".to_owned()));

    let mut scalar = NodeBuilder::new("Pair");
    scalar.push_child(&Reference::parse("key"), Literal::new("Key", "k")).unwrap();
    assert!(scalar.push_child(&Reference::parse("key"), Literal::new("Key", "j")).is_err());
    assert_eq!(print(&builder.finish()), "ab");
}
