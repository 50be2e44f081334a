//! Wrappers applied to productions when a language is loaded.

use std::mem;

use quill_cst::{Attributes, Name};
use quill_errors::{Error, Result};
use rustc_hash::FxHashSet;

use crate::matchable::Kind;
use crate::{Effects, Instruction, Invocation, Matchable, Production, ProductionKind, Resume, Step, token};

#[derive(Debug, Clone)]
enum EnhancerKind {
    Nodes,
    Trivia(Name),
    Trace,
}

/// A production transformer.
#[derive(Debug, Clone)]
pub struct Enhancer {
    kind: EnhancerKind,
    except: FxHashSet<Name>,
}

impl Enhancer {
    /// Brackets every structural production in `StartNode`/`EndNode`, opening
    /// the node with the invocation's props as attributes.
    pub fn nodes() -> Self {
        Self { kind: EnhancerKind::Nodes, except: FxHashSet::default() }
    }

    /// Lets structural productions skip the `trivia` token before each node or
    /// token they match, and after the root's content.
    pub fn trivia(trivia: impl Into<Name>) -> Self {
        Self { kind: EnhancerKind::Trivia(trivia.into()), except: FxHashSet::default() }
    }

    /// Logs every instruction and answer at `trace` level.
    pub fn trace() -> Self {
        Self { kind: EnhancerKind::Trace, except: FxHashSet::default() }
    }

    #[must_use]
    pub fn except<I>(mut self, types: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Name>,
    {
        self.except.extend(types.into_iter().map(Into::into));
        self
    }

    pub(crate) fn applies(&self, kind: ProductionKind, ty: &Name) -> bool {
        if self.except.contains(ty) {
            return false;
        }
        match self.kind {
            EnhancerKind::Nodes | EnhancerKind::Trivia(_) => kind == ProductionKind::Node,
            EnhancerKind::Trace => true,
        }
    }

    pub(crate) fn wrap(&self, invocation: &Invocation, inner: Box<dyn Production>) -> Box<dyn Production> {
        match &self.kind {
            EnhancerKind::Nodes => Box::new(NodeBoundaries {
                ty: invocation.ty().clone(),
                attributes: Some(invocation.props().clone()),
                inner,
                phase: Boundary::Open,
            }),
            EnhancerKind::Trivia(trivia) => Box::new(Trivia {
                trivia: trivia.clone(),
                root: invocation.is_root(),
                inner,
                phase: Phase::Inner,
            }),
            EnhancerKind::Trace => Box::new(Trace { ty: invocation.ty().clone(), inner }),
        }
    }
}

enum Boundary {
    Open,
    Starting,
    Running,
    Closing,
}

struct NodeBoundaries {
    ty: Name,
    attributes: Option<Attributes>,
    inner: Box<dyn Production>,
    phase: Boundary,
}

impl NodeBoundaries {
    fn forward(&mut self, input: Resume) -> Result<Step> {
        self.phase = Boundary::Running;
        match self.inner.resume(input)? {
            Step::Return => {
                self.phase = Boundary::Closing;
                Ok(Step::Yield(Instruction::EndNode { ty: self.ty.clone() }))
            }
            step => Ok(step),
        }
    }
}

impl Production for NodeBoundaries {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        match self.phase {
            Boundary::Open => {
                self.phase = Boundary::Starting;
                let attributes = self.attributes.take().unwrap_or_default();
                Ok(Step::Yield(Instruction::StartNode { ty: self.ty.clone(), attributes }))
            }
            Boundary::Starting => self.forward(Resume::Start),
            Boundary::Running => self.forward(input),
            Boundary::Closing => Ok(Step::Return),
        }
    }

    fn force_fail(&mut self) -> Result<Step> {
        match self.phase {
            Boundary::Running => self.inner.force_fail(),
            Boundary::Open | Boundary::Starting | Boundary::Closing => Ok(Step::Return),
        }
    }
}

enum Phase {
    /// Answers go to the wrapped production.
    Inner,
    /// The explicit branch guarding `then` was opened.
    Branched { then: Matchable },
    /// Trivia was attempted; `then` comes next.
    Trivia { then: Matchable, guarded: bool },
    /// `then` was attempted.
    Target { guarded: bool, probe: bool },
    /// The guarding branch was settled; `result` is the answer for the wrapped production.
    Settled { result: Resume },
    /// Trailing trivia of the root was attempted.
    Trailing,
}

struct Trivia {
    trivia: Name,
    root: bool,
    inner: Box<dyn Production>,
    phase: Phase,
}

impl Trivia {
    fn trivia(&self) -> Instruction {
        Instruction::Match(token(self.trivia.clone()).with_effects(Effects::EAT_MATCH))
    }

    fn wants_trivia(&self, matchable: &Matchable) -> bool {
        matches!(matchable.kind, Kind::Node | Kind::Token) && matchable.ty != self.trivia
    }

    fn forward(&mut self, input: Resume) -> Result<Step> {
        match self.inner.resume(input)? {
            Step::Yield(Instruction::Match(then)) if self.wants_trivia(&then) => {
                if then.effects.needs_branch() {
                    self.phase = Phase::Branched { then };
                    Ok(Step::Yield(Instruction::Branch))
                } else {
                    self.phase = Phase::Trivia { then, guarded: false };
                    Ok(Step::Yield(self.trivia()))
                }
            }
            Step::Return if self.root => {
                self.phase = Phase::Trailing;
                Ok(Step::Yield(self.trivia()))
            }
            step => Ok(step),
        }
    }
}

impl Production for Trivia {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        match mem::replace(&mut self.phase, Phase::Inner) {
            Phase::Inner => self.forward(input),
            Phase::Branched { then } => {
                self.phase = Phase::Trivia { then, guarded: true };
                Ok(Step::Yield(self.trivia()))
            }
            Phase::Trivia { then, guarded } => {
                let probe = then.effects.success == crate::Success::Probe;
                self.phase = Phase::Target { guarded, probe };
                Ok(Step::Yield(Instruction::Match(then)))
            }
            Phase::Target { guarded: false, .. } => self.forward(input),
            Phase::Target { guarded: true, probe } => {
                let keep = !probe && matches!(input, Resume::Matched(_));
                self.phase = Phase::Settled { result: input };
                Ok(Step::Yield(if keep { Instruction::Accept } else { Instruction::Reject }))
            }
            Phase::Settled { result } => match input {
                Resume::Ack => self.forward(result),
                other => Err(Error::invalid_state(format!("settling a trivia branch was answered with {other:?}"))),
            },
            Phase::Trailing => Ok(Step::Return),
        }
    }

    fn force_fail(&mut self) -> Result<Step> {
        self.inner.force_fail()
    }
}

struct Trace {
    ty: Name,
    inner: Box<dyn Production>,
}

impl Production for Trace {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        log::trace!("{} <- {input:?}", self.ty);
        let step = self.inner.resume(input)?;
        log::trace!("{} -> {step:?}", self.ty);
        Ok(step)
    }

    fn force_fail(&mut self) -> Result<Step> {
        log::trace!("{} failed", self.ty);
        self.inner.force_fail()
    }
}
