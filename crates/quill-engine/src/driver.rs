use quill_cst::{Node, Tag, TagLog, assemble};
use quill_errors::{ErrorKind, Result};

use crate::engine::{Engine, Event};
use crate::{Language, Resume};

/// Tags of a run, produced as the caller pulls them.
///
/// The run stops at the first error. Productions that `resolve` a future fail
/// with [`ErrorKind::ResolveInSyncDriver`]; use [`parse_async`] for those.
pub struct Tags<'l> {
    engine: Engine<'l>,
    done: bool,
}

impl Iterator for Tags<'_> {
    type Item = Result<Tag>;

    fn next(&mut self) -> Option<Result<Tag>> {
        if self.done {
            return None;
        }
        let item = match self.engine.next_event() {
            Ok(Event::Tag(tag)) => return Some(Ok(tag)),
            Ok(Event::Done) => None,
            Ok(Event::Resolve { ty, .. }) => {
                Some(Err(ErrorKind::ResolveInSyncDriver { ty: ty.to_string() }.into()))
            }
            Err(error) => Some(Err(error)),
        };
        self.done = true;
        item
    }
}

/// Like [`Tags`], awaiting the futures productions `resolve` along the way.
pub struct AsyncTags<'l> {
    engine: Engine<'l>,
    done: bool,
}

impl AsyncTags<'_> {
    pub async fn next(&mut self) -> Option<Result<Tag>> {
        if self.done {
            return None;
        }
        loop {
            let item = match self.engine.next_event() {
                Ok(Event::Tag(tag)) => return Some(Ok(tag)),
                Ok(Event::Resolve { ty, future }) => match future.await {
                    Ok(value) => {
                        log::trace!("resolved a future for `{ty}`");
                        self.engine.provide(Resume::Resolved(value));
                        continue;
                    }
                    Err(message) => {
                        log::debug!("a future for `{ty}` failed: {message}");
                        self.engine.provide(Resume::Unresolved(message));
                        continue;
                    }
                },
                Ok(Event::Done) => None,
                Err(error) => Some(Err(error)),
            };
            self.done = true;
            return item;
        }
    }

    pub async fn collect(mut self) -> Result<Vec<Tag>> {
        let mut tags = Vec::new();
        while let Some(tag) = self.next().await {
            tags.push(tag?);
        }
        Ok(tags)
    }
}

pub fn parse<'l>(language: &'l Language, text: &str) -> Tags<'l> {
    Tags { engine: Engine::parse(language, text), done: false }
}

pub fn parse_log(language: &Language, text: &str) -> Result<TagLog> {
    TagLog::new(parse(language, text).collect::<Result<_>>()?)
}

pub fn parse_tree(language: &Language, text: &str) -> Result<Node> {
    assemble(parse(language, text).collect::<Result<Vec<_>>>()?)
}

pub fn parse_async<'l>(language: &'l Language, text: &str) -> AsyncTags<'l> {
    AsyncTags { engine: Engine::parse(language, text), done: false }
}

pub async fn parse_tree_async(language: &Language, text: &str) -> Result<Node> {
    assemble(parse_async(language, text).collect().await?)
}

/// Tags that print `value` in `language`, reusing the literals it carries.
pub fn build_tags<'l>(language: &'l Language, value: &Node) -> Tags<'l> {
    Tags { engine: Engine::build(language, value), done: false }
}

/// Runs the grammar over `value` instead of text, producing a tree that prints.
///
/// Literals the value carries are reused where the grammar accepts them; the
/// rest is synthesized, so a value with its literals stripped comes back in
/// the grammar's canonical layout.
pub fn build(language: &Language, value: &Node) -> Result<Node> {
    assemble(build_tags(language, value).collect::<Result<Vec<_>>>()?)
}
