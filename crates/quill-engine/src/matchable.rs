use std::fmt;
use std::sync::Arc;

use quill_cst::{Attributes, Name, Reference, Value};

/// What happens when an attempt succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Success {
    /// Keep the consumed input and emitted tags.
    Commit,
    /// Report the match but leave input and output as they were.
    Probe,
}

/// What happens when an attempt does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The caller fails too.
    Fatal,
    /// The caller is told there was no match.
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effects {
    pub success: Success,
    pub failure: Failure,
}

impl Effects {
    pub const EAT: Self = Self { success: Success::Commit, failure: Failure::Fatal };
    pub const EAT_MATCH: Self = Self { success: Success::Commit, failure: Failure::Silent };
    pub const PROBE: Self = Self { success: Success::Probe, failure: Failure::Silent };

    /// Attempts that may be undone run in a branch of their own.
    pub fn needs_branch(self) -> bool {
        self.success == Success::Probe || self.failure == Failure::Silent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharClass {
    Any,
    Digit,
    HexDigit,
    Alpha,
    AlphaNumeric,
    Whitespace,
    OneOf(Arc<str>),
    NoneOf(Arc<str>),
    Range(char, char),
}

impl CharClass {
    pub fn matches(&self, c: char) -> bool {
        match self {
            Self::Any => true,
            Self::Digit => c.is_ascii_digit(),
            Self::HexDigit => c.is_ascii_hexdigit(),
            Self::Alpha => c.is_alphabetic(),
            Self::AlphaNumeric => c.is_alphanumeric(),
            Self::Whitespace => c.is_whitespace(),
            Self::OneOf(set) => set.contains(c),
            Self::NoneOf(set) => !set.contains(c),
            Self::Range(low, high) => (*low..=*high).contains(&c),
        }
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("."),
            Self::Digit => f.write_str("\\d"),
            Self::HexDigit => f.write_str("[0-9a-fA-F]"),
            Self::Alpha => f.write_str("\\p{Alphabetic}"),
            Self::AlphaNumeric => f.write_str("\\w"),
            Self::Whitespace => f.write_str("\\s"),
            Self::OneOf(set) => write!(f, "[{}]", set.escape_debug()),
            Self::NoneOf(set) => write!(f, "[^{}]", set.escape_debug()),
            Self::Range(low, high) => write!(f, "[{low}-{high}]"),
        }
    }
}

/// Character-level matchers, usable only inside an open token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Literal(Arc<str>),
    Class { class: CharClass, min: u32, max: Option<u32> },
}

impl Pattern {
    /// The text this pattern matches at `peek(0)`, `peek(1)`, ...
    pub(crate) fn scan(&self, peek: impl Fn(usize) -> Option<char>) -> Option<String> {
        match self {
            Self::Literal(text) => {
                let matches = text.chars().enumerate().all(|(index, c)| peek(index) == Some(c));
                matches.then(|| text.to_string())
            }
            Self::Class { class, min, max } => {
                let mut text = String::new();
                let mut count = 0;
                while max.is_none_or(|max| count < max) {
                    match peek(count as usize) {
                        Some(c) if class.matches(c) => text.push(c),
                        _ => break,
                    }
                    count += 1;
                }
                (count >= *min).then_some(text)
            }
        }
    }

    /// The text this pattern produces with no input to read.
    pub(crate) fn synthesize(&self) -> Option<String> {
        match self {
            Self::Literal(text) => Some(text.to_string()),
            Self::Class { min: 0, .. } => Some(String::new()),
            Self::Class { .. } => None,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => write!(f, "{text:?}"),
            Self::Class { class, min: 1, max: Some(1) } => write!(f, "{class}"),
            Self::Class { class, min, max: None } => write!(f, "{class}{{{min},}}"),
            Self::Class { class, min, max: Some(max) } => write!(f, "{class}{{{min},{max}}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Kind {
    Node,
    Token,
    Fragment,
    Pattern(Pattern),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Balance {
    /// Pushes a span closed by `closer`; a lexical span also enters `context`.
    Open { closer: Arc<str>, context: Option<Name> },
    /// Pops the innermost span, whose closer must equal the token text.
    Close,
}

/// The subject of an `eat`, `eat_match` or `probe`.
#[derive(Debug, Clone)]
pub struct Matchable {
    pub(crate) kind: Kind,
    pub(crate) ty: Name,
    pub(crate) props: Attributes,
    pub(crate) reference: Option<Reference>,
    pub(crate) effects: Effects,
    pub(crate) balance: Option<Balance>,
}

/// A structural production, stored as a node when the grammar emits one.
pub fn node(ty: impl Into<Name>) -> Matchable {
    Matchable::new(Kind::Node, ty.into())
}

/// A lexical production whose text becomes one literal.
pub fn token(ty: impl Into<Name>) -> Matchable {
    Matchable::new(Kind::Token, ty.into())
}

/// A lexical production that contributes to the enclosing token.
pub fn fragment(ty: impl Into<Name>) -> Matchable {
    Matchable::new(Kind::Fragment, ty.into())
}

pub fn literal(text: &str) -> Matchable {
    pattern(Pattern::Literal(text.into()))
}

/// Exactly one character of `class`; see [`Matchable::repeat`].
pub fn class(class: CharClass) -> Matchable {
    pattern(Pattern::Class { class, min: 1, max: Some(1) })
}

fn pattern(pattern: Pattern) -> Matchable {
    let ty = Name::from(pattern.to_string());
    Matchable::new(Kind::Pattern(pattern), ty)
}

impl Matchable {
    fn new(kind: Kind, ty: Name) -> Self {
        Self { kind, ty, props: Attributes::new(), reference: None, effects: Effects::EAT, balance: None }
    }

    pub fn ty(&self) -> &Name {
        &self.ty
    }

    pub fn props(&self) -> &Attributes {
        &self.props
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.reference.as_ref()
    }

    pub fn effects(&self) -> Effects {
        self.effects
    }

    pub fn is_node(&self) -> bool {
        self.kind == Kind::Node
    }

    pub fn is_token(&self) -> bool {
        self.kind == Kind::Token
    }

    /// Stores the match under `reference` (`name` or `name[]`) in the current node.
    #[must_use]
    pub fn at(mut self, reference: impl Into<Reference>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    #[must_use]
    pub fn prop(mut self, key: impl Into<Name>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Shorthand for the `value` prop, which token reuse also compares against.
    #[must_use]
    pub fn value(self, text: &str) -> Self {
        self.prop("value", text)
    }

    /// On success the token opens a span that a [`Matchable::balancer`] token
    /// must close with `closer`.
    #[must_use]
    pub fn balanced(mut self, closer: &str) -> Self {
        self.balance = Some(Balance::Open { closer: closer.into(), context: None });
        self
    }

    /// Like [`Matchable::balanced`], and the span runs in lexical `context`.
    #[must_use]
    pub fn balanced_lexical(mut self, closer: &str, context: impl Into<Name>) -> Self {
        self.balance = Some(Balance::Open { closer: closer.into(), context: Some(context.into()) });
        self
    }

    #[must_use]
    pub fn balancer(mut self) -> Self {
        self.balance = Some(Balance::Close);
        self
    }

    /// Repetition bounds of a character class pattern; no effect on anything else.
    #[must_use]
    pub fn repeat(mut self, min: u32, max: Option<u32>) -> Self {
        if let Kind::Pattern(Pattern::Class { class, .. }) = self.kind {
            let pattern = Pattern::Class { class, min, max };
            self.ty = Name::from(pattern.to_string());
            self.kind = Kind::Pattern(pattern);
        }
        self
    }

    #[must_use]
    pub fn one_or_more(self) -> Self {
        self.repeat(1, None)
    }

    #[must_use]
    pub fn with_effects(mut self, effects: Effects) -> Self {
        self.effects = effects;
        self
    }

    #[must_use]
    pub(crate) fn with_ty(mut self, ty: Name) -> Self {
        self.ty = ty;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peek(text: &str) -> impl Fn(usize) -> Option<char> + '_ {
        move |index| text.chars().nth(index)
    }

    #[test]
    fn literal_patterns_match_whole() {
        let pattern = Pattern::Literal("true".into());
        assert_eq!(pattern.scan(peek("true,")), Some("true".to_owned()));
        assert_eq!(pattern.scan(peek("tru")), None);
        assert_eq!(pattern.synthesize(), Some("true".to_owned()));
    }

    #[test]
    fn class_patterns_respect_bounds() {
        let digits = Pattern::Class { class: CharClass::Digit, min: 1, max: None };
        assert_eq!(digits.scan(peek("123]")), Some("123".to_owned()));
        assert_eq!(digits.scan(peek("]")), None);
        assert_eq!(digits.synthesize(), None);

        let hex = Pattern::Class { class: CharClass::HexDigit, min: 4, max: Some(4) };
        assert_eq!(hex.scan(peek("00e9ff")), Some("00e9".to_owned()));
        assert_eq!(hex.scan(peek("0e9")), None);

        let blank = Pattern::Class { class: CharClass::Whitespace, min: 0, max: None };
        assert_eq!(blank.scan(peek("x")), Some(String::new()));
        assert_eq!(blank.synthesize(), Some(String::new()));
    }

    #[test]
    fn repeat_renames_the_pattern() {
        let matchable = class(CharClass::NoneOf("\"\\".into())).one_or_more();
        assert_eq!(matchable.ty().as_str(), "[^\\\"\\\\]{1,}");
        assert_eq!(token("Whitespace").repeat(0, None).ty().as_str(), "Whitespace");
    }
}
