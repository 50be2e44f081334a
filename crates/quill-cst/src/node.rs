use std::fmt::{self, Write as _};

use indexmap::IndexMap;
use indexmap::map::Entry;
use quill_errors::Result;
use triomphe::Arc;

use crate::tag::malformed;
use crate::{Attributes, Literal, Name, NodeId, Path, Reference, Resolver, Value};

/// An immutable CST node.
///
/// Besides its properties, a node keeps its own tag log: references to its
/// children and the unreferenced literals (punctuation, trivia) between them,
/// in source order.
#[derive(Clone, PartialEq, Eq)]
pub struct Node(Arc<NodeData>);

#[derive(Clone, PartialEq, Eq)]
struct NodeData {
    ty: Name,
    attributes: Attributes,
    tags: Vec<NodeTag>,
    properties: IndexMap<Name, Property>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTag {
    Reference(Path),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    One(Child),
    Many(Vec<Child>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Node(Node),
    Token(Literal),
}

impl Child {
    pub fn ty(&self) -> &Name {
        match self {
            Self::Node(node) => node.ty(),
            Self::Token(literal) => literal.ty(),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            Self::Token(_) => None,
        }
    }

    pub fn as_token(&self) -> Option<&Literal> {
        match self {
            Self::Token(literal) => Some(literal),
            Self::Node(_) => None,
        }
    }
}

impl From<Node> for Child {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl From<Literal> for Child {
    fn from(literal: Literal) -> Self {
        Self::Token(literal)
    }
}

impl Node {
    pub fn ty(&self) -> &Name {
        &self.0.ty
    }

    pub fn attributes(&self) -> &Attributes {
        &self.0.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.0.attributes.get(key)
    }

    pub fn tags(&self) -> &[NodeTag] {
        &self.0.tags
    }

    pub fn properties(&self) -> &IndexMap<Name, Property> {
        &self.0.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.0.properties.get(name)
    }

    pub fn get(&self, path: &Path) -> Option<&Child> {
        match (self.property(path.name())?, path.index()) {
            (Property::One(child), None) => Some(child),
            (Property::Many(children), Some(index)) => children.get(index as usize),
            _ => None,
        }
    }

    /// Referenced children in source order.
    pub fn children(&self) -> impl Iterator<Item = (&Path, &Child)> + '_ {
        self.0.tags.iter().filter_map(|tag| match tag {
            NodeTag::Reference(path) => Some((path, self.get(path)?)),
            NodeTag::Literal(_) => None,
        })
    }

    /// Unreferenced literals in source order.
    pub fn literals(&self) -> impl Iterator<Item = &Literal> + '_ {
        self.0.tags.iter().filter_map(|tag| match tag {
            NodeTag::Literal(literal) => Some(literal),
            NodeTag::Reference(_) => None,
        })
    }

    /// A copy of this node with `key` bound to `value`; children are shared.
    #[must_use]
    pub fn with_attribute(&self, key: impl Into<Name>, value: impl Into<Value>) -> Self {
        let mut data = NodeData::clone(&self.0);
        data.attributes.insert(key.into(), value.into());
        Self(Arc::new(data))
    }

    /// The same tree without unreferenced literals.
    ///
    /// Only the referenced structure survives: rebuilding the result produces
    /// canonical text for the grammar.
    #[must_use]
    pub fn to_abstract(&self) -> Self {
        let mut stack = Vec::new();
        let mut frame = Abstracting::new(self);
        loop {
            if let Some(slot) = frame.pending.pop() {
                if let Some(Child::Node(child)) = frame.slot(slot) {
                    let child = Abstracting::new(child);
                    stack.push((std::mem::replace(&mut frame, child), slot));
                }
                continue;
            }
            let node = frame.finish();
            let Some((parent, slot)) = stack.pop() else { return node };
            frame = parent;
            if let Some(child) = frame.slot(slot) {
                *child = Child::Node(node);
            }
        }
    }

    /// Indented outline of the tree, one tag per line.
    pub fn debug_tree(&self) -> String {
        let mut out = String::new();
        write_header(self, "", 0, &mut out);
        let mut stack = vec![(self, self.tags().iter())];
        while let Some((node, tags)) = stack.last_mut() {
            let node = *node;
            let Some(tag) = tags.next() else {
                stack.pop();
                continue;
            };
            let indent = stack.len() * 2;
            match tag {
                NodeTag::Literal(literal) => {
                    let _ = writeln!(out, "{:indent$}{} {:?}", "", literal.ty(), literal.text());
                }
                NodeTag::Reference(path) => match node.get(path) {
                    Some(Child::Node(child)) => {
                        write_header(child, &format!("{path}: "), stack.len(), &mut out);
                        stack.push((child, child.tags().iter()));
                    }
                    Some(Child::Token(literal)) => {
                        let _ = writeln!(out, "{:indent$}{path}: {} {:?}", "", literal.ty(), literal.text());
                    }
                    None => {
                        let _ = writeln!(out, "{:indent$}{path}: <missing>", "");
                    }
                },
            }
        }
        out
    }
}

fn write_header(node: &Node, prefix: &str, depth: usize, out: &mut String) {
    let _ = write!(out, "{:indent$}{prefix}{}", "", node.ty(), indent = depth * 2);
    for (key, value) in node.attributes() {
        let _ = write!(out, " {key}={value}");
    }
    out.push('\n');
}

/// A node being rebuilt by [`Node::to_abstract`]; its properties start as a
/// shallow copy and node children are swapped in as they are converted.
struct Abstracting {
    node: Node,
    properties: IndexMap<Name, Property>,
    /// Positions of node children still to convert, last first.
    pending: Vec<(usize, usize)>,
}

impl Abstracting {
    fn new(node: &Node) -> Self {
        let properties = node.properties().clone();
        let mut pending = Vec::new();
        for (index, property) in properties.values().enumerate() {
            match property {
                Property::One(Child::Node(_)) => pending.push((index, 0)),
                Property::One(Child::Token(_)) => {}
                Property::Many(children) => {
                    let nodes = children.iter().enumerate().filter(|(_, child)| child.as_node().is_some());
                    pending.extend(nodes.map(|(item, _)| (index, item)));
                }
            }
        }
        pending.reverse();
        Self { node: node.clone(), properties, pending }
    }

    fn slot(&mut self, (index, item): (usize, usize)) -> Option<&mut Child> {
        match self.properties.get_index_mut(index)?.1 {
            Property::One(child) => Some(child),
            Property::Many(children) => children.get_mut(item),
        }
    }

    fn finish(self) -> Node {
        let tags = self.node.tags().iter().filter(|tag| matches!(tag, NodeTag::Reference(_))).cloned().collect();
        Node(Arc::new(NodeData {
            ty: self.node.ty().clone(),
            attributes: self.node.attributes().clone(),
            tags,
            properties: self.properties,
        }))
    }
}

/// Unlinks children one level at a time so dropping a deep tree does not
/// recurse once per level.
impl Drop for NodeData {
    fn drop(&mut self) {
        let mut nodes = Vec::new();
        take_children(&mut self.properties, &mut nodes);
        while let Some(mut node) = nodes.pop() {
            if let Some(data) = Arc::get_mut(&mut node.0) {
                take_children(&mut data.properties, &mut nodes);
            }
        }
    }
}

fn take_children(properties: &mut IndexMap<Name, Property>, nodes: &mut Vec<Node>) {
    for (_, property) in properties.drain(..) {
        match property {
            Property::One(Child::Node(node)) => nodes.push(node),
            Property::One(Child::Token(_)) => {}
            Property::Many(children) => nodes.extend(children.into_iter().filter_map(|child| match child {
                Child::Node(node) => Some(node),
                Child::Token(_) => None,
            })),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("ty", &self.0.ty)
            .field("attributes", &self.0.attributes)
            .field("properties", &self.0.properties)
            .finish()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::print(self))
    }
}

/// Builds a [`Node`] one tag at a time.
///
/// Children are attached through a [`Resolver`], so list ordinals follow the
/// same rule as during matching.
#[derive(Debug)]
pub struct NodeBuilder {
    ty: Name,
    attributes: Attributes,
    tags: Vec<NodeTag>,
    properties: IndexMap<Name, Property>,
    resolver: Resolver,
}

impl NodeBuilder {
    pub fn new(ty: impl Into<Name>) -> Self {
        Self::with_attributes(ty, Attributes::new())
    }

    pub fn with_attributes(ty: impl Into<Name>, attributes: Attributes) -> Self {
        Self {
            ty: ty.into(),
            attributes,
            tags: Vec::new(),
            properties: IndexMap::new(),
            resolver: Resolver::new(NodeId::new(0)),
        }
    }

    pub fn ty(&self) -> &Name {
        &self.ty
    }

    pub fn bind(&mut self, key: impl Into<Name>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn push_literal(&mut self, literal: Literal) {
        self.tags.push(NodeTag::Literal(literal));
    }

    /// Stores `child` under the next path for `reference`.
    pub fn push_child(&mut self, reference: &Reference, child: impl Into<Child>) -> Result<Path> {
        let path = self.resolver.resolve(reference);
        self.attach(path.clone(), child.into())?;
        Ok(path)
    }

    /// Stores `child` under `path`, which must be the path the resolver would
    /// give next.
    pub fn attach(&mut self, path: Path, child: Child) -> Result<()> {
        let expected = self.resolver.consume(&path.reference());
        if expected != path {
            return Err(malformed(format!("reference `{path}` out of order, expected `{expected}`")));
        }
        match (self.properties.entry(path.name().clone()), path.index()) {
            (Entry::Vacant(entry), None) => {
                entry.insert(Property::One(child));
            }
            (Entry::Vacant(entry), Some(_)) => {
                entry.insert(Property::Many(vec![child]));
            }
            (Entry::Occupied(mut entry), Some(_)) => match entry.get_mut() {
                Property::Many(children) => children.push(child),
                Property::One(_) => return Err(malformed(format!("`{path}` mixes a scalar and a list"))),
            },
            (Entry::Occupied(_), None) => return Err(malformed(format!("`{path}` is bound twice"))),
        }
        self.tags.push(NodeTag::Reference(path));
        Ok(())
    }

    pub fn finish(self) -> Node {
        Node(Arc::new(NodeData {
            ty: self.ty,
            attributes: self.attributes,
            tags: self.tags,
            properties: self.properties,
        }))
    }
}
