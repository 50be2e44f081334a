use std::fmt::Display;

pub use annotate_snippets::Renderer;
use annotate_snippets::{Level, Snippet};
pub use text_size::{TextRange, TextSize};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can stop a run.
///
/// A production that simply does not match is not an error: the engine reports
/// that back to the caller as a non-match and may try something else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("expected `{ty}`")]
    NoMatch { ty: String },
    #[error("unclosed span: expected `{closer}`")]
    UnclosedSpan { closer: String },
    #[error("mismatched span: expected `{expected}`, found `{found}`")]
    MismatchedSpan { expected: String, found: String },
    #[error("unconsumed input after `{ty}`")]
    UnconsumedInput { ty: String },

    #[error("token `{ty}` started inside token `{open}`")]
    NestedToken { ty: String, open: String },
    #[error("`{ty}` can only be matched inside a token")]
    OutsideToken { ty: String },
    #[error("`{ty}` is not allowed in lexical context `{context}`")]
    IllegalInContext { ty: String, context: String },
    #[error("`{ty}` yielded `{instruction}` while being failed")]
    YieldAfterFail { ty: String, instruction: String },
    #[error("`{ty}` awaited a future the engine does not drive")]
    ForeignAwait { ty: String },
    #[error("`{ty}` returned with {open} explicit branch(es) open")]
    UnbalancedBranch { ty: String, open: usize },
    #[error("`{ty}` popped the base lexical context")]
    ContextUnderflow { ty: String },
    #[error("reference `{path}` is not followed by a node or token")]
    DanglingReference { path: String },
    #[error("node `{ty}` has no reference in its parent")]
    UnreferencedNode { ty: String },
    #[error("expected end of `{expected}`, found end of `{found}`")]
    NodeMismatch { expected: String, found: String },
    #[error("no production for `{ty}`")]
    UnknownProduction { ty: String },
    #[error("invalid state transition: {0}")]
    InvalidState(String),
    #[error("covers relation has a cycle through `{ty}`")]
    CoverCycle { ty: String },
    #[error("`{ty}` cannot resolve futures under the synchronous driver")]
    ResolveInSyncDriver { ty: String },
    #[error("{0}")]
    Script(String),

    #[error("future failed: {0}")]
    Async(String),
    #[error("malformed tag stream: {0}")]
    Assembly(String),
}

impl ErrorKind {
    /// The grammar misused the engine, independent of the input.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::NestedToken { .. }
                | Self::OutsideToken { .. }
                | Self::IllegalInContext { .. }
                | Self::YieldAfterFail { .. }
                | Self::ForeignAwait { .. }
                | Self::UnbalancedBranch { .. }
                | Self::ContextUnderflow { .. }
                | Self::DanglingReference { .. }
                | Self::UnreferencedNode { .. }
                | Self::NodeMismatch { .. }
                | Self::UnknownProduction { .. }
                | Self::InvalidState(_)
                | Self::CoverCycle { .. }
                | Self::ResolveInSyncDriver { .. }
                | Self::Script(_)
        )
    }

    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::NoMatch { .. }
                | Self::UnclosedSpan { .. }
                | Self::MismatchedSpan { .. }
                | Self::UnconsumedInput { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    kind: ErrorKind,
    offset: Option<TextSize>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, offset: None }
    }

    pub fn script(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Script(message.into()))
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState(message.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Byte offset into the parsed text, when the error happened in parse mode.
    pub fn offset(&self) -> Option<TextSize> {
        self.offset
    }

    /// Attaches `offset` unless an inner layer already did.
    #[must_use]
    pub fn at(mut self, offset: Option<TextSize>) -> Self {
        if self.offset.is_none() {
            self.offset = offset;
        }
        self
    }

    pub fn diagnostic(&self, text: &str) -> Diagnostic {
        let len = TextSize::of(text);
        let start = self.offset.unwrap_or(len).min(len);
        let width = text[usize::from(start)..].chars().next().map_or(TextSize::from(0), TextSize::of);
        Diagnostic::error(self.kind.to_string(), TextRange::at(start, width))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    message: String,
    range: TextRange,
}

impl Diagnostic {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn range(&self) -> TextRange {
        self.range
    }

    pub fn error(message: impl Into<String>, range: TextRange) -> Self {
        Self { message: message.into(), range }
    }

    pub fn render<'a>(
        &'a self,
        renderer: &'a Renderer,
        path: &'a str,
        text: &'a str,
    ) -> impl Display + 'a {
        let message = Level::Error.title(&self.message).snippet(
            Snippet::source(text)
                .origin(path)
                .annotation(Level::Error.span(self.range.into()).label("here"))
                .fold(true),
        );
        renderer.render(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_attached_once() {
        let error = Error::from(ErrorKind::UnclosedSpan { closer: "]".into() })
            .at(Some(4.into()))
            .at(Some(9.into()));
        assert_eq!(error.offset(), Some(4.into()));
        assert!(error.kind().is_malformed_input());
        assert!(!error.kind().is_protocol_violation());
    }

    #[test]
    fn diagnostic_points_at_the_next_character() {
        let error = Error::from(ErrorKind::NoMatch { ty: "Expression".into() }).at(Some(1.into()));
        let diagnostic = error.diagnostic("[é]");
        assert_eq!(diagnostic.range(), TextRange::new(1.into(), 3.into()));

        let rendered = diagnostic.render(&Renderer::plain(), "input.json", "[é]").to_string();
        assert!(rendered.contains("expected `Expression`"));
        assert!(rendered.contains("input.json:1:2"));
    }

    #[test]
    fn diagnostic_at_end_of_input_is_empty() {
        let error = Error::from(ErrorKind::UnclosedSpan { closer: "]".into() }).at(Some(4.into()));
        assert_eq!(error.diagnostic("[1,2").range(), TextRange::empty(4.into()));
    }
}
