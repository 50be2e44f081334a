use crate::{Child, Node, NodeTag, Tag};

/// The source text of `node`.
pub fn print(node: &Node) -> String {
    let mut out = String::new();
    print_into(node, &mut out);
    out
}

fn print_into(root: &Node, out: &mut String) {
    let mut stack = vec![(root, root.tags().iter())];
    while let Some((node, tags)) = stack.last_mut() {
        let node = *node;
        let Some(tag) = tags.next() else {
            stack.pop();
            continue;
        };
        match tag {
            NodeTag::Literal(literal) => out.push_str(literal.text()),
            NodeTag::Reference(path) => match node.get(path) {
                Some(Child::Node(child)) => stack.push((child, child.tags().iter())),
                Some(Child::Token(literal)) => out.push_str(literal.text()),
                None => {}
            },
        }
    }
}

/// The text of a flat tag stream: its literals, concatenated.
pub fn print_tags<'a>(tags: impl IntoIterator<Item = &'a Tag>) -> String {
    tags.into_iter().filter_map(Tag::literal).map(|literal| literal.text()).collect()
}
