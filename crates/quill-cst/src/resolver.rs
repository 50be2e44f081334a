use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::{Name, Path, Reference};

/// Identity of a node within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Turns the references a node makes into paths.
///
/// A list reference `name[]` resolves to `name.N`, where `N` counts how many
/// times the owner consumed `name[]` before. Branches copy the counters lazily,
/// so an abandoned attempt never moves the committed count.
#[derive(Debug, Clone)]
pub struct Resolver {
    owner: NodeId,
    counters: Rc<FxHashMap<Name, u32>>,
}

impl Resolver {
    pub fn new(owner: NodeId) -> Self {
        Self { owner, counters: Rc::default() }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn count(&self, name: &str) -> u32 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// The path `reference` would get, without recording it.
    pub fn resolve(&self, reference: &Reference) -> Path {
        let index = reference.is_array().then(|| self.count(reference.name()));
        Path::new(reference.name().clone(), index)
    }

    pub fn consume(&mut self, reference: &Reference) -> Path {
        let path = self.resolve(reference);
        if let Some(index) = path.index() {
            Rc::make_mut(&mut self.counters).insert(reference.name().clone(), index + 1);
        }
        path
    }

    pub fn branch(&self) -> Self {
        self.clone()
    }

    /// Takes over the counters of `child` if it belongs to the same node.
    pub fn accept(&mut self, child: Self) -> bool {
        if child.owner != self.owner {
            return false;
        }
        self.counters = child.counters;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_references_count_up() {
        let mut resolver = Resolver::new(NodeId::new(0));
        let elements = Reference::parse("elements[]");
        let paths: Vec<String> = (0..3).map(|_| resolver.consume(&elements).to_string()).collect();
        assert_eq!(paths, ["elements.0", "elements.1", "elements.2"]);
        assert_eq!(resolver.resolve(&elements).to_string(), "elements.3");
        assert_eq!(resolver.consume(&Reference::parse("open")).to_string(), "open");
    }

    #[test]
    fn rejected_branch_does_not_advance() {
        let elements = Reference::parse("elements[]");
        let mut resolver = Resolver::new(NodeId::new(7));
        resolver.consume(&elements);

        let mut attempt = resolver.branch();
        assert_eq!(attempt.consume(&elements).to_string(), "elements.1");
        drop(attempt);
        assert_eq!(resolver.count("elements"), 1);

        let mut retry = resolver.branch();
        assert_eq!(retry.consume(&elements).to_string(), "elements.1");
        assert!(resolver.accept(retry));
        assert_eq!(resolver.consume(&elements).to_string(), "elements.2");
    }

    #[test]
    fn accept_ignores_other_owners() {
        let elements = Reference::parse("elements[]");
        let mut resolver = Resolver::new(NodeId::new(1));
        let mut stranger = Resolver::new(NodeId::new(2));
        stranger.consume(&elements);
        assert!(!resolver.accept(stranger));
        assert_eq!(resolver.count("elements"), 0);
    }
}
