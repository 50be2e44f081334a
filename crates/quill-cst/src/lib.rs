//! Concrete syntax trees and the tag streams they are assembled from.
//!
//! A parse emits a flat stream of [`Tag`]s. [`assemble`] folds that stream into
//! an immutable [`Node`] tree and [`print`] turns a tree back into the exact
//! text it was parsed from.

mod assemble;
mod name;
mod node;
mod path;
mod print;
mod resolver;
mod tag;
mod value;

#[cfg(test)]
mod tests;

pub use crate::assemble::assemble;
pub use crate::name::Name;
pub use crate::node::{Child, Node, NodeBuilder, NodeTag, Property};
pub use crate::path::{Path, Reference};
pub use crate::print::{print, print_tags};
pub use crate::resolver::{NodeId, Resolver};
pub use crate::tag::{Literal, Tag, TagLog};
pub use crate::value::{Attributes, Value};
