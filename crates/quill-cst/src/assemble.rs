use quill_errors::Result;

use crate::tag::malformed;
use crate::{Child, Node, NodeBuilder, Path, Tag};

struct Open {
    builder: NodeBuilder,
    /// Where the finished node goes in its parent; `None` for the root.
    at: Option<Path>,
}

/// Folds a tag stream into a tree.
///
/// List ordinals are recomputed while folding; a stream whose reference paths
/// disagree with them is rejected.
pub fn assemble(tags: impl IntoIterator<Item = Tag>) -> Result<Node> {
    let mut stack: Vec<Open> = Vec::new();
    let mut pending: Option<Path> = None;
    let mut root = None;

    for tag in tags {
        match tag {
            Tag::Open { ty, attributes } => {
                if root.is_some() {
                    return Err(malformed(format!("`<{ty}>` after the root was closed")));
                }
                let at = pending.take();
                if at.is_none() && !stack.is_empty() {
                    return Err(malformed(format!("`<{ty}>` has no reference")));
                }
                stack.push(Open { builder: NodeBuilder::with_attributes(ty, attributes), at });
            }
            Tag::Close { ty, attributes } => {
                if let Some(path) = pending.take() {
                    return Err(malformed(format!("reference `{path}` before `</{ty}>`")));
                }
                let Some(Open { mut builder, at }) = stack.pop() else {
                    return Err(malformed(format!("`</{ty}>` closes nothing")));
                };
                if *builder.ty() != ty {
                    return Err(malformed(format!("`</{ty}>` closes `<{}>`", builder.ty())));
                }
                for (key, value) in attributes {
                    builder.bind(key, value);
                }
                let node = builder.finish();
                match (stack.last_mut(), at) {
                    (Some(parent), Some(path)) => parent.builder.attach(path, Child::Node(node))?,
                    (Some(_), None) => return Err(malformed(format!("`<{}>` has no reference", node.ty()))),
                    (None, _) => root = Some(node),
                }
            }
            Tag::Reference(path) => {
                if let Some(previous) = pending.replace(path) {
                    return Err(malformed(format!("reference `{previous}` is followed by another reference")));
                }
                if stack.is_empty() {
                    return Err(malformed("reference outside of a node".to_owned()));
                }
            }
            Tag::Literal(literal) => {
                let Some(open) = stack.last_mut() else {
                    return Err(malformed(format!("literal {:?} outside of a node", literal.text())));
                };
                match pending.take() {
                    Some(path) => open.builder.attach(path, Child::Token(literal))?,
                    None => open.builder.push_literal(literal),
                }
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("`<{}>` is never closed", open.builder.ty())));
    }
    root.ok_or_else(|| malformed("no root node".to_owned()))
}
