use std::fmt;

use crate::Name;

/// A property reference as a grammar writes it: `name`, or `name[]` for a
/// property holding a list of children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    name: Name,
    array: bool,
}

impl Reference {
    pub fn scalar(name: impl Into<Name>) -> Self {
        Self { name: name.into(), array: false }
    }

    pub fn array(name: impl Into<Name>) -> Self {
        Self { name: name.into(), array: true }
    }

    pub fn parse(text: &str) -> Self {
        match text.strip_suffix("[]") {
            Some(name) => Self::array(name),
            None => Self::scalar(text),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn is_array(&self) -> bool {
        self.array
    }
}

impl From<&str> for Reference {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// A reference resolved against its owner: `name`, or `name.N` for the N-th
/// element of a list property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    name: Name,
    index: Option<u32>,
}

impl Path {
    pub fn new(name: impl Into<Name>, index: Option<u32>) -> Self {
        Self { name: name.into(), index }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn index(&self) -> Option<u32> {
        self.index
    }

    /// The reference this path was resolved from.
    pub fn reference(&self) -> Reference {
        Reference { name: self.name.clone(), array: self.index.is_some() }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}.{index}", self.name),
            None => f.write_str(&self.name),
        }
    }
}
