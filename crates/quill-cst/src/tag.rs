use std::fmt;
use std::sync::Arc;

use quill_errors::{Error, ErrorKind, Result};

use crate::{Attributes, Name, Path};

/// A typed piece of source text. Concatenating every literal of a run in
/// emission order reproduces the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    ty: Name,
    text: Arc<str>,
}

impl Literal {
    pub fn new(ty: impl Into<Name>, text: impl Into<Arc<str>>) -> Self {
        Self { ty: ty.into(), text: text.into() }
    }

    pub fn ty(&self) -> &Name {
        &self.ty
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One entry of the stream a matcher emits.
///
/// Attributes bound after a node was opened travel on its `Close` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Open { ty: Name, attributes: Attributes },
    Close { ty: Name, attributes: Attributes },
    /// Names the property the next node or token is stored under.
    Reference(Path),
    Literal(Literal),
}

impl Tag {
    pub fn literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(literal) => Some(literal),
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { ty, attributes } => {
                write!(f, "<{ty}")?;
                write_attributes(f, attributes)?;
                f.write_str(">")
            }
            Self::Close { ty, attributes } => {
                write!(f, "</{ty}")?;
                write_attributes(f, attributes)?;
                f.write_str(">")
            }
            Self::Reference(path) => write!(f, "{path}:"),
            Self::Literal(literal) => write!(f, "{} {:?}", literal.ty(), literal.text()),
        }
    }
}

fn write_attributes(f: &mut fmt::Formatter<'_>, attributes: &Attributes) -> fmt::Result {
    for (key, value) in attributes {
        write!(f, " {key}={value}")?;
    }
    Ok(())
}

/// The committed tags of a run with their open/close pairing.
///
/// Positions are indices into the log; `prev` and `next` are index neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLog {
    tags: Vec<Tag>,
    pairs: Vec<Option<usize>>,
}

impl TagLog {
    pub fn new(tags: Vec<Tag>) -> Result<Self> {
        let mut pairs = vec![None; tags.len()];
        let mut open = Vec::new();
        for (index, tag) in tags.iter().enumerate() {
            match tag {
                Tag::Open { .. } => open.push(index),
                Tag::Close { ty, .. } => {
                    let Some(start) = open.pop() else {
                        return Err(malformed(format!("`</{ty}>` closes nothing")));
                    };
                    if let Tag::Open { ty: opened, .. } = &tags[start] {
                        if opened != ty {
                            return Err(malformed(format!("`</{ty}>` closes `<{opened}>`")));
                        }
                    }
                    pairs[start] = Some(index);
                    pairs[index] = Some(start);
                }
                Tag::Reference(_) | Tag::Literal(_) => {}
            }
        }
        if let Some(&start) = open.last() {
            return Err(malformed(format!("`{}` is never closed", tags[start])));
        }
        Ok(Self { tags, pairs })
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.tags.get(index)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn prev(&self, index: usize) -> Option<usize> {
        index.checked_sub(1).filter(|&prev| prev < self.tags.len())
    }

    pub fn next(&self, index: usize) -> Option<usize> {
        Some(index + 1).filter(|&next| next < self.tags.len())
    }

    /// The matching close of an open tag, or the matching open of a close tag.
    pub fn pair(&self, index: usize) -> Option<usize> {
        self.pairs.get(index).copied().flatten()
    }

    pub fn text(&self) -> String {
        crate::print_tags(&self.tags)
    }

    pub fn into_tags(self) -> Vec<Tag> {
        self.tags
    }
}

pub(crate) fn malformed(message: String) -> Error {
    ErrorKind::Assembly(message).into()
}
