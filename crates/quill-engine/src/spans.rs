//! Lexical contexts and balanced spans. Both live in `im` vectors so a branch
//! shares them with its parent until one side changes.

use std::sync::Arc;

use im::Vector;
use quill_cst::{Name, NodeId};

/// The lexical context every run starts in.
pub(crate) const BARE: &str = "Bare";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpanKind {
    Structural,
    /// Also entered a lexical context, left again when the span closes.
    Lexical,
}

#[derive(Debug, Clone)]
pub(crate) struct Span {
    pub(crate) kind: SpanKind,
    pub(crate) closer: Arc<str>,
    /// Node that was open when the span started; it may not end before the span.
    pub(crate) owner: Option<NodeId>,
}

pub(crate) fn contexts() -> Vector<Name> {
    Vector::unit(Name::from(BARE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_start_bare() {
        let contexts = contexts();
        assert_eq!(contexts.back().map(Name::as_str), Some(BARE));
        assert_eq!(contexts.len(), 1);
    }

    #[test]
    fn branched_contexts_diverge() {
        let mut base = contexts();
        base.push_back(Name::from("String"));

        let mut branch = base.clone();
        assert_eq!(branch.pop_back().as_deref(), Some("String"));
        branch.push_back(Name::from("Comment"));

        assert_eq!(base.back().map(Name::as_str), Some("String"));
        assert_eq!(branch.back().map(Name::as_str), Some("Comment"));
        assert_eq!(base.len(), branch.len());
    }
}
