use std::collections::VecDeque;

use im::Vector;
use quill_cst::{Attributes, Child, Literal, Name, Node, NodeId, NodeTag, Path, Resolver, Tag};
use quill_input::Cursor;

use crate::arena::Key;
use crate::matchable::Balance;
use crate::spans::{self, Span};

pub(crate) type StateId = Key<State>;

/// A state leaves the arena when it is accepted or rejected, so only the live
/// statuses are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Status {
    Active,
    /// Has an active branch; only that branch may move.
    Suspended,
}

/// The value a node is being rebuilt from, with a position in its tag log.
///
/// Only the literal at the position can be reused; consuming a reference moves
/// the position past that reference, so literals keep their place relative to
/// the children around them.
#[derive(Debug, Clone)]
pub(crate) struct ValueCursor {
    node: Node,
    position: usize,
}

impl ValueCursor {
    pub(crate) fn new(node: Node) -> Self {
        Self { node, position: 0 }
    }

    pub(crate) fn get(&self, path: &Path) -> Option<&Child> {
        self.node.get(path)
    }

    pub(crate) fn next_literal(&self) -> Option<&Literal> {
        match self.node.tags().get(self.position)? {
            NodeTag::Literal(literal) => Some(literal),
            NodeTag::Reference(_) => None,
        }
    }

    pub(crate) fn advance(&mut self) {
        self.position += 1;
    }

    /// Moves past the reference to `path`, skipping literals nobody reused.
    pub(crate) fn pass(&mut self, path: &Path) {
        let rest = self.node.tags().get(self.position..).unwrap_or_default();
        if let Some(offset) = rest.iter().position(|tag| matches!(tag, NodeTag::Reference(seen) if seen == path)) {
            self.position += offset + 1;
        }
    }
}

/// Bookkeeping for a node that is open in a state.
#[derive(Debug, Clone)]
pub(crate) struct NodeFrame {
    pub(crate) id: NodeId,
    pub(crate) ty: Name,
    pub(crate) resolver: Resolver,
    /// Attributes bound after the open tag; emitted with the close tag.
    pub(crate) bound: Attributes,
    pub(crate) value: Option<ValueCursor>,
}

impl NodeFrame {
    pub(crate) fn new(id: NodeId, ty: Name, value: Option<ValueCursor>) -> Self {
        Self { id, ty, resolver: Resolver::new(id), bound: Attributes::new(), value }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TokenBuf {
    pub(crate) ty: Name,
    pub(crate) text: String,
    pub(crate) balance: Option<Balance>,
    /// The token reads a private input that it has to consume entirely.
    pub(crate) whole: bool,
    /// The private input is a literal of the value being rebuilt.
    pub(crate) reuse: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingRef {
    pub(crate) path: Path,
    /// In build mode, the child stored at `path`.
    pub(crate) target: Option<Child>,
}

/// A position in the [`Journal`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Mark {
    tags: usize,
    text: usize,
}

/// Tags and literal text emitted along the chain of live states.
///
/// Only the innermost state is active, so whatever a state emitted sits at the
/// end of the journal. Accepting a state leaves its entries in place; rejecting
/// it rolls the journal back to the state's mark.
#[derive(Debug, Default)]
pub(crate) struct Journal {
    tags: VecDeque<Tag>,
    /// Absolute index of `tags[0]`; earlier tags were handed out.
    flushed: usize,
    text: String,
}

impl Journal {
    pub(crate) fn mark(&self) -> Mark {
        Mark { tags: self.flushed + self.tags.len(), text: self.text.len() }
    }

    pub(crate) fn push(&mut self, tag: Tag) {
        self.tags.push_back(tag);
    }

    pub(crate) fn emit_literal(&mut self, literal: Literal) {
        self.text.push_str(literal.text());
        self.tags.push_back(Tag::Literal(literal));
    }

    pub(crate) fn text_len(&self) -> usize {
        self.text.len()
    }

    pub(crate) fn text_since(&self, offset: usize) -> &str {
        self.text.get(offset..).unwrap_or_default()
    }

    pub(crate) fn rollback(&mut self, mark: Mark) {
        self.tags.truncate(mark.tags.saturating_sub(self.flushed));
        self.text.truncate(mark.text);
    }

    /// Hands out the tags emitted before `floor`, or every tag without one.
    pub(crate) fn drain(&mut self, floor: Option<Mark>) -> impl Iterator<Item = Tag> + '_ {
        let end = floor.map_or(self.tags.len(), |mark| mark.tags.saturating_sub(self.flushed).min(self.tags.len()));
        self.flushed += end;
        self.tags.drain(..end)
    }
}

/// One transactional match state.
///
/// Everything a branch may change is either owned or an `im` vector shared
/// with the parent, so forking does not depend on how deep the parse is.
#[derive(Debug)]
pub(crate) struct State {
    pub(crate) status: Status,
    pub(crate) parent: Option<StateId>,
    /// Journal position when the state was forked.
    pub(crate) mark: Mark,
    /// Characters patterns read; `None` between tokens in build mode.
    pub(crate) input: Option<Cursor<char>>,
    pub(crate) nodes: Vector<NodeFrame>,
    pub(crate) contexts: Vector<Name>,
    pub(crate) spans: Vector<Span>,
    pub(crate) token: Option<TokenBuf>,
    pub(crate) pending: Option<PendingRef>,
}

impl State {
    pub(crate) fn root(input: Option<Cursor<char>>) -> Self {
        Self {
            status: Status::Active,
            parent: None,
            mark: Mark::default(),
            input,
            nodes: Vector::new(),
            contexts: spans::contexts(),
            spans: Vector::new(),
            token: None,
            pending: None,
        }
    }

    /// Suspends this state and returns a child that starts where it stands.
    pub(crate) fn fork(&mut self, id: StateId, mark: Mark) -> Self {
        self.status = Status::Suspended;
        Self {
            status: Status::Active,
            parent: Some(id),
            mark,
            input: self.input.as_ref().map(Cursor::fork),
            nodes: self.nodes.clone(),
            contexts: self.contexts.clone(),
            spans: self.spans.clone(),
            token: self.token.clone(),
            pending: self.pending.clone(),
        }
    }

    /// Takes over everything an accepted child changed and becomes active again.
    pub(crate) fn absorb(&mut self, mut child: Self) {
        match (&mut self.input, child.input.take()) {
            (Some(input), Some(moved)) if input.same_source(&moved) => {
                input.accept(moved);
            }
            (input, moved) => *input = moved,
        }
        self.nodes = child.nodes;
        self.contexts = child.contexts;
        self.spans = child.spans;
        self.token = child.token;
        self.pending = child.pending;
        self.status = Status::Active;
    }

    pub(crate) fn owner(&self) -> Option<NodeId> {
        self.nodes.back().map(|node| node.id)
    }
}

#[cfg(test)]
mod tests {
    use quill_cst::{Reference, assemble};

    use super::*;
    use crate::arena::Arena;

    #[test]
    fn accepted_child_carries_everything_back() {
        let mut arena = Arena::default();
        let root_id = arena.alloc(State::root(None));
        let mut journal = Journal::default();
        let mut root = State::root(Some(Cursor::text("ab".into())));
        root.nodes.push_back(NodeFrame::new(NodeId::new(0), Name::from("List"), None));

        let mut child = root.fork(root_id, journal.mark());
        assert_eq!(root.status, Status::Suspended);
        if let Some(input) = child.input.as_mut() {
            input.advance(1);
        }
        if let Some(node) = child.nodes.back_mut() {
            node.resolver.consume(&Reference::parse("items[]"));
        }
        journal.emit_literal(Literal::new("Item", "a"));

        root.absorb(child);
        assert_eq!(root.status, Status::Active);
        assert_eq!(root.input.as_ref().map(Cursor::position), Some(1));
        assert_eq!(root.nodes.back().map(|node| node.resolver.count("items")), Some(1));
        assert_eq!(journal.text_since(0), "a");
        assert_eq!(journal.drain(None).count(), 1);
    }

    #[test]
    fn rejected_child_is_rolled_back() {
        let mut arena = Arena::default();
        let root_id = arena.alloc(State::root(None));
        let mut journal = Journal::default();
        let mut root = State::root(Some(Cursor::text("ab".into())));
        root.nodes.push_back(NodeFrame::new(NodeId::new(0), Name::from("List"), None));
        journal.push(Tag::Open { ty: Name::from("List"), attributes: Attributes::new() });

        let mut child = root.fork(root_id, journal.mark());
        if let Some(input) = child.input.as_mut() {
            input.advance(2);
        }
        if let Some(node) = child.nodes.back_mut() {
            node.resolver.consume(&Reference::parse("items[]"));
        }
        journal.emit_literal(Literal::new("Item", "ab"));
        assert_eq!(journal.text_len(), 2);

        journal.rollback(child.mark);
        drop(child);
        assert_eq!(root.input.as_ref().map(Cursor::position), Some(0));
        assert_eq!(root.nodes.back().map(|node| node.resolver.count("items")), Some(0));
        assert_eq!(journal.text_len(), 0);
        assert_eq!(journal.mark().tags, 1);
    }

    #[test]
    fn drained_tags_stop_at_the_floor() {
        let mut journal = Journal::default();
        journal.emit_literal(Literal::new("Punct", "["));
        let floor = journal.mark();
        journal.emit_literal(Literal::new("Digits", "1"));

        let handed: Vec<Tag> = journal.drain(Some(floor)).collect();
        assert_eq!(handed.len(), 1);
        journal.rollback(floor);
        assert_eq!(journal.text_since(0), "[");
        assert_eq!(journal.drain(None).count(), 0);
        assert_eq!(journal.mark(), floor);
    }

    #[test]
    fn value_cursor_keeps_literals_in_place() {
        let value = assemble([
            Tag::Open { ty: Name::from("List"), attributes: Attributes::new() },
            Tag::Literal(Literal::new("Punct", "[")),
            Tag::Reference(Path::new("items", Some(0))),
            Tag::Literal(Literal::new("Digits", "1")),
            Tag::Literal(Literal::new("Space", " ")),
            Tag::Literal(Literal::new("Punct", "]")),
            Tag::Close { ty: Name::from("List"), attributes: Attributes::new() },
        ])
        .unwrap();

        let mut cursor = ValueCursor::new(value);
        assert_eq!(cursor.next_literal().map(Literal::text), Some("["));
        cursor.advance();
        assert!(cursor.next_literal().is_none());
        cursor.pass(&Path::new("items", Some(0)));
        assert_eq!(cursor.next_literal().map(Literal::text), Some(" "));
        assert!(cursor.get(&Path::new("items", Some(0))).is_some());
    }
}
