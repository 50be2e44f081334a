use std::future::Future;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use quill_cst::Name;
use quill_errors::{Error, ErrorKind, Result};
use rustc_hash::FxHashMap;

use crate::script::{Cx, script};
use crate::spans::BARE;
use crate::{Enhancer, Factory, Invocation, Production};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductionKind {
    Node,
    Token,
    Fragment,
}

/// Lexical contexts a lexical production may run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contexts {
    Any,
    Only(Vec<Name>),
}

impl Contexts {
    pub fn only<I>(contexts: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Name>,
    {
        Self::Only(contexts.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, context: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(contexts) => contexts.iter().any(|allowed| allowed == context),
        }
    }
}

impl Default for Contexts {
    fn default() -> Self {
        Self::only([BARE])
    }
}

#[derive(Clone)]
pub struct ProductionDef {
    kind: ProductionKind,
    factory: Factory,
    contexts: Contexts,
}

impl ProductionDef {
    pub fn kind(&self) -> ProductionKind {
        self.kind
    }

    pub fn contexts(&self) -> &Contexts {
        &self.contexts
    }
}

/// Productions by type name.
#[derive(Clone, Default)]
pub struct Grammar {
    productions: FxHashMap<Name, ProductionDef>,
}

impl Grammar {
    pub fn get(&self, ty: &str) -> Option<&ProductionDef> {
        self.productions.get(ty)
    }

    pub fn contains(&self, ty: &str) -> bool {
        self.productions.contains_key(ty)
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }
}

/// The "is a" relation between alias types and the types they cover.
#[derive(Debug, Clone, Default)]
pub struct Covers {
    edges: IndexMap<Name, IndexSet<Name>>,
}

impl Covers {
    fn new(edges: IndexMap<Name, IndexSet<Name>>) -> Result<Self> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(ty: &Name, edges: &IndexMap<Name, IndexSet<Name>>, marks: &mut FxHashMap<Name, Mark>) -> Result<()> {
            match marks.get(ty) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(ErrorKind::CoverCycle { ty: ty.to_string() }.into()),
                None => {}
            }
            marks.insert(ty.clone(), Mark::Visiting);
            for covered in edges.get(ty).into_iter().flatten() {
                visit(covered, edges, marks)?;
            }
            marks.insert(ty.clone(), Mark::Done);
            Ok(())
        }

        let mut marks = FxHashMap::default();
        for alias in edges.keys() {
            visit(alias, &edges, &mut marks)?;
        }
        Ok(Self { edges })
    }

    pub fn is_alias(&self, ty: &str) -> bool {
        self.edges.contains_key(ty)
    }

    /// Directly covered types, in declaration order.
    pub fn covered(&self, alias: &str) -> impl Iterator<Item = &Name> + '_ {
        self.edges.get(alias).into_iter().flatten()
    }

    /// Whether `ty` is `of`, or is covered by it transitively.
    pub fn is_a(&self, ty: &str, of: &str) -> bool {
        ty == of || self.covered(of).any(|covered| self.is_a(ty, covered))
    }
}

/// A structural and a lexical grammar with everything needed to run them.
pub struct Language {
    name: Name,
    root: Name,
    structural: Grammar,
    lexical: Grammar,
    covers: Covers,
    enhancers: Vec<Enhancer>,
}

impl Language {
    pub fn builder(name: impl Into<Name>) -> LanguageBuilder {
        LanguageBuilder::new(name)
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn root(&self) -> &Name {
        &self.root
    }

    pub fn structural(&self) -> &Grammar {
        &self.structural
    }

    pub fn lexical(&self) -> &Grammar {
        &self.lexical
    }

    pub fn covers(&self) -> &Covers {
        &self.covers
    }

    pub fn is_a(&self, ty: &str, of: &str) -> bool {
        self.covers.is_a(ty, of)
    }

    /// A fresh production for `invocation`, wrapped by the enhancers that apply.
    pub(crate) fn instantiate(&self, def: &ProductionDef, invocation: &Invocation) -> Box<dyn Production> {
        let mut production = (def.factory)(invocation.clone());
        for enhancer in &self.enhancers {
            if enhancer.applies(def.kind, invocation.ty()) {
                production = enhancer.wrap(invocation, production);
            }
        }
        production
    }
}

/// Collects productions, covers and enhancers into a [`Language`].
///
/// Enhancers wrap in the order they are added, so the last one added sees the
/// production's instructions last.
pub struct LanguageBuilder {
    name: Name,
    root: Option<Name>,
    structural: Grammar,
    lexical: Grammar,
    covers: IndexMap<Name, IndexSet<Name>>,
    contexts: Vec<(Name, Contexts)>,
    enhancers: Vec<Enhancer>,
}

impl LanguageBuilder {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            root: None,
            structural: Grammar::default(),
            lexical: Grammar::default(),
            covers: IndexMap::new(),
            contexts: Vec::new(),
            enhancers: Vec::new(),
        }
    }

    #[must_use]
    pub fn root(mut self, ty: impl Into<Name>) -> Self {
        self.root = Some(ty.into());
        self
    }

    /// Registers a hand-written production.
    #[must_use]
    pub fn production<F>(mut self, kind: ProductionKind, ty: impl Into<Name>, factory: F) -> Self
    where
        F: Fn(Invocation) -> Box<dyn Production> + 'static,
    {
        let contexts = match kind {
            ProductionKind::Node => Contexts::Any,
            ProductionKind::Token | ProductionKind::Fragment => Contexts::default(),
        };
        let grammar = match kind {
            ProductionKind::Node => &mut self.structural,
            ProductionKind::Token | ProductionKind::Fragment => &mut self.lexical,
        };
        grammar.productions.insert(ty.into(), ProductionDef { kind, factory: Rc::new(factory), contexts });
        self
    }

    #[must_use]
    pub fn node<F, Fut>(self, ty: impl Into<Name>, body: F) -> Self
    where
        F: Fn(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.production(ProductionKind::Node, ty, script(body))
    }

    #[must_use]
    pub fn token<F, Fut>(self, ty: impl Into<Name>, body: F) -> Self
    where
        F: Fn(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.production(ProductionKind::Token, ty, script(body))
    }

    #[must_use]
    pub fn fragment<F, Fut>(self, ty: impl Into<Name>, body: F) -> Self
    where
        F: Fn(Cx) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.production(ProductionKind::Fragment, ty, script(body))
    }

    /// Declares where the lexical production `ty` may run (`Bare` by default).
    #[must_use]
    pub fn contexts(mut self, ty: impl Into<Name>, contexts: Contexts) -> Self {
        self.contexts.push((ty.into(), contexts));
        self
    }

    /// Declares `alias` as covering `types`, tried in the given order.
    #[must_use]
    pub fn cover<I>(mut self, alias: impl Into<Name>, types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Name>,
    {
        self.covers.entry(alias.into()).or_default().extend(types.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn enhance(mut self, enhancer: Enhancer) -> Self {
        self.enhancers.push(enhancer);
        self
    }

    pub fn build(mut self) -> Result<Language> {
        let root = self.root.ok_or_else(|| Error::script(format!("language `{}` has no root", self.name)))?;
        if !self.structural.contains(&root) && !self.covers.contains_key(&root) {
            return Err(ErrorKind::UnknownProduction { ty: root.to_string() }.into());
        }
        for (ty, contexts) in self.contexts {
            let Some(def) = self.lexical.productions.get_mut(&ty) else {
                return Err(ErrorKind::UnknownProduction { ty: ty.to_string() }.into());
            };
            def.contexts = contexts;
        }
        let covers = Covers::new(self.covers)?;
        log::debug!(
            "built language `{}`: {} structural and {} lexical productions",
            self.name,
            self.structural.len(),
            self.lexical.len()
        );
        Ok(Language {
            name: self.name,
            root,
            structural: self.structural,
            lexical: self.lexical,
            covers,
            enhancers: self.enhancers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covers(pairs: &[(&str, &[&str])]) -> Result<Covers> {
        let edges = pairs
            .iter()
            .map(|(alias, types)| (Name::from(*alias), types.iter().map(|&ty| Name::from(ty)).collect()))
            .collect();
        Covers::new(edges)
    }

    #[test]
    fn is_a_is_transitive() {
        let covers = covers(&[("Expression", &["Literal", "Array"]), ("Literal", &["Number", "String"])]).unwrap();
        assert!(covers.is_a("Number", "Expression"));
        assert!(covers.is_a("Array", "Array"));
        assert!(!covers.is_a("Expression", "Number"));
        let direct: Vec<&str> = covers.covered("Expression").map(Name::as_str).collect();
        assert_eq!(direct, ["Literal", "Array"]);
    }

    #[test]
    fn cycles_are_rejected() {
        let error = covers(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"])]).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::CoverCycle { .. }));
        assert!(covers(&[("A", &["B", "C"]), ("B", &["C"])]).is_ok());
    }

    #[test]
    fn builder_checks_root_and_contexts() {
        let missing_root = LanguageBuilder::new("empty").build();
        assert!(missing_root.is_err());

        let unknown = LanguageBuilder::new("l")
            .node("Root", |_cx| async { Ok(()) })
            .root("Root")
            .contexts("Word", Contexts::Any)
            .build();
        assert!(matches!(unknown.err().map(|error| error.kind().clone()), Some(ErrorKind::UnknownProduction { .. })));
    }
}
