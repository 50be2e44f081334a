use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use quill_cst::{Attributes, Name, Reference, Value};

use crate::Matchable;

/// A value a production waits on under the asynchronous driver.
pub type ResolveFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Any>, String>>>>;

/// What a production asks the engine to do next.
pub enum Instruction {
    Match(Matchable),
    Fail,
    Branch,
    Accept,
    /// Rejects the innermost explicit branch; with none open, fails the production.
    Reject,
    StartNode { ty: Name, attributes: Attributes },
    EndNode { ty: Name },
    Reference(Reference),
    BindAttribute { key: Name, value: Value },
    PushLexicalContext(Name),
    PopLexicalContext,
    Resolve(ResolveFuture),
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match(matchable) => {
                let effects = matchable.effects();
                write!(f, "Match({} {:?}/{:?}", matchable.ty(), effects.success, effects.failure)?;
                if let Some(reference) = matchable.reference() {
                    write!(f, " at {reference}")?;
                }
                f.write_str(")")
            }
            Self::Fail => f.write_str("Fail"),
            Self::Branch => f.write_str("Branch"),
            Self::Accept => f.write_str("Accept"),
            Self::Reject => f.write_str("Reject"),
            Self::StartNode { ty, .. } => write!(f, "StartNode({ty})"),
            Self::EndNode { ty } => write!(f, "EndNode({ty})"),
            Self::Reference(reference) => write!(f, "Reference({reference})"),
            Self::BindAttribute { key, value } => write!(f, "BindAttribute({key}={value})"),
            Self::PushLexicalContext(context) => write!(f, "PushLexicalContext({context})"),
            Self::PopLexicalContext => f.write_str("PopLexicalContext"),
            Self::Resolve(_) => f.write_str("Resolve"),
        }
    }
}

/// The text a successful attempt matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matched {
    ty: Name,
    text: String,
}

impl Matched {
    pub(crate) fn new(ty: Name, text: String) -> Self {
        Self { ty, text }
    }

    pub fn ty(&self) -> &Name {
        &self.ty
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// The engine's answer to the last instruction.
pub enum Resume {
    /// First resumption of a fresh production.
    Start,
    /// The instruction was carried out.
    Ack,
    Matched(Matched),
    NoMatch,
    Resolved(Box<dyn Any>),
    /// The awaited future failed with this message.
    Unresolved(String),
}

impl fmt::Debug for Resume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("Start"),
            Self::Ack => f.write_str("Ack"),
            Self::Matched(matched) => write!(f, "Matched({:?})", matched.text()),
            Self::NoMatch => f.write_str("NoMatch"),
            Self::Resolved(_) => f.write_str("Resolved"),
            Self::Unresolved(message) => write!(f, "Unresolved({message:?})"),
        }
    }
}

#[derive(Debug)]
pub enum Step {
    Yield(Instruction),
    Return,
}
