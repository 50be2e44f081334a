//! A grammar engine producing concrete syntax trees.
//!
//! A [`Language`] pairs a structural grammar (nodes) with a lexical one (tokens
//! and fragments). Productions are resumable: each one yields [`Instruction`]s
//! and the engine answers with a [`Resume`]. Matching runs on transactional
//! states, so any attempt can be undone by rejecting the branch it ran in.
//!
//! The same grammar parses text ([`parse`]) and prints trees ([`build`]).

mod arena;
mod choice;
mod driver;
mod engine;
mod enhancer;
mod grammar;
mod instruction;
mod matchable;
mod production;
mod script;
mod spans;
mod state;

pub use quill_cst as cst;

pub use crate::driver::{
    AsyncTags, Tags, build, build_tags, parse, parse_async, parse_log, parse_tree, parse_tree_async,
};
pub use crate::enhancer::Enhancer;
pub use crate::grammar::{Contexts, Covers, Grammar, Language, LanguageBuilder, ProductionDef, ProductionKind};
pub use crate::instruction::{Instruction, Matched, ResolveFuture, Resume, Step};
pub use crate::matchable::{
    CharClass, Effects, Failure, Matchable, Pattern, Success, class, fragment, literal, node, token,
};
pub use crate::production::{Factory, Invocation, Production};
pub use crate::script::{Cx, script};
