//! The dispatcher: runs productions on a stack of frames and turns their
//! instructions into state changes and tags.

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;

use drop_bomb::DropBomb;
use quill_cst::{Attributes, Child, Literal, Name, Node, NodeId, Reference, Tag, Value};
use quill_errors::{Error, ErrorKind, Result};
use quill_input::Cursor;
use text_size::TextSize;

use crate::arena::Arena;
use crate::choice::Choice;
use crate::matchable::{Balance, Kind, Pattern};
use crate::spans::{BARE, Span, SpanKind};
use crate::state::{Journal, Mark, NodeFrame, PendingRef, State, StateId, Status, TokenBuf, ValueCursor};
use crate::{
    Contexts, Failure, Instruction, Invocation, Language, Matchable, Matched, Production, ResolveFuture, Resume, Step,
    Success,
};

pub(crate) enum Event {
    Tag(Tag),
    /// The running production waits on `future`; answer with [`Engine::provide`].
    Resolve { ty: Name, future: ResolveFuture },
    Done,
}

enum Mode {
    Parse { text: Rc<str> },
    Build { value: Node },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Node,
    Token,
    Fragment,
    Choice,
}

/// Where a frame started, to measure what it matched.
struct Start {
    journal: usize,
    token: usize,
    depth: usize,
}

struct Frame {
    production: Box<dyn Production>,
    matchable: Matchable,
    role: Role,
    /// State the production currently acts on.
    state: StateId,
    branched: bool,
    explicit: Vec<StateId>,
    root: bool,
    start: Start,
    bomb: DropBomb,
}

impl Frame {
    fn commits(&self) -> bool {
        self.matchable.effects.success == Success::Commit
    }
}

pub(crate) struct Engine<'l> {
    language: &'l Language,
    mode: Mode,
    states: Arena<State>,
    root: StateId,
    frames: Vec<Frame>,
    journal: Journal,
    /// Where the root's live branch started; tags before it are settled.
    floor: Option<Mark>,
    resume: Option<Resume>,
    output: VecDeque<Tag>,
    next_node: u32,
    started: bool,
    finished: bool,
}

impl<'l> Engine<'l> {
    pub(crate) fn parse(language: &'l Language, text: &str) -> Self {
        let text: Rc<str> = text.into();
        let input = Cursor::text(Rc::clone(&text));
        Self::new(language, Mode::Parse { text }, Some(input))
    }

    pub(crate) fn build(language: &'l Language, value: &Node) -> Self {
        Self::new(language, Mode::Build { value: value.clone() }, None)
    }

    fn new(language: &'l Language, mode: Mode, input: Option<Cursor<char>>) -> Self {
        let mut states = Arena::default();
        let root = states.alloc(State::root(input));
        Self {
            language,
            mode,
            states,
            root,
            frames: Vec::new(),
            journal: Journal::default(),
            floor: None,
            resume: None,
            output: VecDeque::new(),
            next_node: 0,
            started: false,
            finished: false,
        }
    }

    pub(crate) fn next_event(&mut self) -> Result<Event> {
        self.step().map_err(|error| error.at(self.offset()))
    }

    /// Answers the `Resolve` the last event carried.
    pub(crate) fn provide(&mut self, resume: Resume) {
        self.resume = Some(resume);
    }

    fn step(&mut self) -> Result<Event> {
        loop {
            if let Some(tag) = self.output.pop_front() {
                return Ok(Event::Tag(tag));
            }
            if self.finished {
                return Ok(Event::Done);
            }
            if !self.started {
                self.started = true;
                self.start()?;
                continue;
            }

            let input = self.resume.take();
            let frame = self.top_mut()?;
            let Some(input) = input else {
                let ty = &frame.matchable.ty;
                return Err(Error::invalid_state(format!("`{ty}` resumed without an answer")));
            };
            match frame.production.resume(input)? {
                Step::Yield(Instruction::Resolve(future)) => {
                    let ty = self.top()?.matchable.ty.clone();
                    return Ok(Event::Resolve { ty, future });
                }
                Step::Yield(instruction) => self.execute(instruction)?,
                Step::Return => self.complete()?,
            }
            self.flush();
        }
    }

    fn start(&mut self) -> Result<()> {
        let language = self.language;
        let ty = match &self.mode {
            Mode::Parse { .. } => language.root().clone(),
            Mode::Build { value } => {
                if !language.is_a(value.ty(), language.root()) {
                    return Err(ErrorKind::NoMatch { ty: language.root().to_string() }.into());
                }
                value.ty().clone()
            }
        };
        log::debug!("running `{}` from `{ty}`", language.name());
        self.dispatch(crate::node(ty))
    }

    /// Moves tags settled in the root state to the output.
    fn flush(&mut self) {
        self.output.extend(self.journal.drain(self.floor));
    }

    fn dispatch(&mut self, matchable: Matchable) -> Result<()> {
        let (caller, root) = match self.frames.last() {
            Some(frame) => (frame.state, frame.root && frame.role == Role::Choice),
            None => (self.root, true),
        };
        log::trace!("dispatch {} from {caller:?}", matchable.ty);

        let role = match &matchable.kind {
            Kind::Pattern(pattern) => {
                let pattern = pattern.clone();
                return self.match_pattern(caller, &matchable, &pattern);
            }
            Kind::Node => Role::Node,
            Kind::Token => Role::Token,
            Kind::Fragment => Role::Fragment,
        };
        let language = self.language;
        let grammar = if role == Role::Node { language.structural() } else { language.lexical() };
        let Some(def) = grammar.get(&matchable.ty) else {
            return self.dispatch_alias(caller, matchable, root);
        };
        self.check_legal(caller, &matchable, role, def.contexts())?;

        if let (true, Some(reference)) = (self.building(), &matchable.reference) {
            let target = self.target_type(caller, reference, &matchable)?;
            if target.is_none_or(|ty| !language.is_a(&ty, &matchable.ty)) {
                return self.no_match(&matchable);
            }
        }

        let state = if matchable.effects.needs_branch() { self.branch(caller)? } else { caller };
        if let Some(reference) = &matchable.reference {
            self.emit_reference(state, reference)?;
        }
        if role == Role::Token {
            self.open_token(state, &matchable)?;
        }
        let invocation = Invocation::new(matchable.ty.clone(), matchable.props.clone(), root);
        let production = language.instantiate(def, &invocation);
        self.push(production, matchable, role, caller, state, root)
    }

    /// An alias with no production of its own: in build mode the value picks the
    /// covered type, otherwise each covered type is tried in order.
    fn dispatch_alias(&mut self, caller: StateId, matchable: Matchable, root: bool) -> Result<()> {
        let language = self.language;
        let candidates: Vec<Name> = language.covers().covered(&matchable.ty).cloned().collect();
        if candidates.is_empty() {
            return Err(ErrorKind::UnknownProduction { ty: matchable.ty.to_string() }.into());
        }

        if let (true, Some(reference)) = (self.building(), &matchable.reference) {
            return match self.target_type(caller, reference, &matchable)? {
                Some(ty) if ty != matchable.ty && language.is_a(&ty, &matchable.ty) => {
                    self.dispatch(matchable.with_ty(ty))
                }
                _ => self.no_match(&matchable),
            };
        }

        let state = if matchable.effects.needs_branch() { self.branch(caller)? } else { caller };
        let choice = Box::new(Choice::new(matchable.clone(), candidates));
        self.push(choice, matchable, Role::Choice, caller, state, root)
    }

    fn check_legal(&self, caller: StateId, matchable: &Matchable, role: Role, contexts: &Contexts) -> Result<()> {
        let state = self.state(caller)?;
        let ty = &matchable.ty;
        let context = state.contexts.back().map_or(BARE, Name::as_str);
        match (role, &state.token) {
            (Role::Node, Some(token)) => {
                Err(Error::invalid_state(format!("node `{ty}` matched inside token `{}`", token.ty)))
            }
            (Role::Token, Some(token)) => {
                Err(ErrorKind::NestedToken { ty: ty.to_string(), open: token.ty.to_string() }.into())
            }
            (Role::Fragment, None) => Err(ErrorKind::OutsideToken { ty: ty.to_string() }.into()),
            (Role::Token | Role::Fragment, _) if !contexts.allows(context) => {
                Err(ErrorKind::IllegalInContext { ty: ty.to_string(), context: context.to_owned() }.into())
            }
            (Role::Token, None) => {
                let at_end = state.input.as_ref().is_some_and(Cursor::is_done);
                match state.spans.back() {
                    Some(span) if at_end && !self.building() => {
                        Err(ErrorKind::UnclosedSpan { closer: span.closer.to_string() }.into())
                    }
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Type of the value stored where `reference` would point, if it has the
    /// right kind for `matchable`.
    fn target_type(&self, caller: StateId, reference: &Reference, matchable: &Matchable) -> Result<Option<Name>> {
        let state = self.state(caller)?;
        let Some(owner) = state.nodes.back() else {
            return Err(Error::invalid_state(format!("reference `{reference}` outside of a node")));
        };
        let path = owner.resolver.resolve(reference);
        let target = owner.value.as_ref().and_then(|value| value.get(&path));
        Ok(match (target, &matchable.kind) {
            (Some(child @ Child::Node(_)), Kind::Node) | (Some(child @ Child::Token(_)), Kind::Token) => {
                Some(child.ty().clone())
            }
            _ => None,
        })
    }

    fn push(
        &mut self,
        production: Box<dyn Production>,
        matchable: Matchable,
        role: Role,
        base: StateId,
        state: StateId,
        root: bool,
    ) -> Result<()> {
        let current = self.state(state)?;
        let start = Start {
            journal: self.journal.text_len(),
            token: current.token.as_ref().map_or(0, |token| token.text.len()),
            depth: current.nodes.len(),
        };
        self.frames.push(Frame {
            production,
            matchable,
            role,
            state,
            branched: base != state,
            explicit: Vec::new(),
            root,
            start,
            bomb: DropBomb::new("frames must leave the stack through `Engine::pop`"),
        });
        self.resume = Some(Resume::Start);
        Ok(())
    }

    fn pop(&mut self) -> Option<Frame> {
        let mut frame = self.frames.pop()?;
        frame.bomb.defuse();
        Some(frame)
    }

    fn match_pattern(&mut self, id: StateId, matchable: &Matchable, pattern: &Pattern) -> Result<()> {
        let commit = matchable.effects.success == Success::Commit;
        let State { token, input, .. } = self.state_mut(id)?;
        let Some(token) = token.as_mut() else {
            return Err(ErrorKind::OutsideToken { ty: matchable.ty.to_string() }.into());
        };
        let text = match input {
            Some(cursor) => pattern.scan(|index| cursor.peek_nth(index)),
            None => pattern.synthesize(),
        };
        match text {
            Some(text) if !(commit && text.is_empty()) => {
                if commit {
                    if let Some(cursor) = input.as_mut() {
                        cursor.advance(text.chars().count());
                    }
                    token.text.push_str(&text);
                }
                self.resume = Some(Resume::Matched(Matched::new(matchable.ty.clone(), text)));
                Ok(())
            }
            _ => self.no_match(matchable),
        }
    }

    fn no_match(&mut self, matchable: &Matchable) -> Result<()> {
        match matchable.effects.failure {
            Failure::Silent => {
                self.resume = Some(Resume::NoMatch);
                Ok(())
            }
            Failure::Fatal => match self.pop() {
                Some(frame) => self.fail(frame, &matchable.ty),
                None => Err(ErrorKind::NoMatch { ty: matchable.ty.to_string() }.into()),
            },
        }
    }

    fn fail_top(&mut self) -> Result<()> {
        let frame = self.pop().ok_or_else(|| Error::invalid_state("failed with no production running"))?;
        let ty = frame.matchable.ty.clone();
        self.fail(frame, &ty)
    }

    /// Fails `frame` and every caller that does not survive it.
    fn fail(&mut self, mut frame: Frame, origin: &Name) -> Result<()> {
        let offset = self.offset_of(frame.state);
        loop {
            self.abandon(&mut frame)?;
            log::trace!("`{}` failed", frame.matchable.ty);
            if frame.matchable.effects.failure == Failure::Silent {
                self.resume = Some(Resume::NoMatch);
                return Ok(());
            }
            match self.pop() {
                Some(caller) => frame = caller,
                None => return Err(Error::from(ErrorKind::NoMatch { ty: origin.to_string() }).at(offset)),
            }
        }
    }

    /// Lets the production clean up and throws away every state it opened.
    fn abandon(&mut self, frame: &mut Frame) -> Result<()> {
        if let Step::Yield(instruction) = frame.production.force_fail()? {
            return Err(ErrorKind::YieldAfterFail {
                ty: frame.matchable.ty.to_string(),
                instruction: format!("{instruction:?}"),
            }
            .into());
        }
        let mut state = frame.state;
        while let Some(explicit) = frame.explicit.pop() {
            state = self.reject(explicit)?;
        }
        if frame.branched {
            self.reject(state)?;
        }
        Ok(())
    }

    fn execute(&mut self, instruction: Instruction) -> Result<()> {
        match instruction {
            Instruction::Match(matchable) => return self.dispatch(matchable),
            Instruction::Fail => return self.fail_top(),
            Instruction::Branch => {
                let current = self.top()?.state;
                let child = self.branch(current)?;
                let frame = self.top_mut()?;
                frame.explicit.push(child);
                frame.state = child;
            }
            Instruction::Accept => {
                let frame = self.top_mut()?;
                let Some(child) = frame.explicit.pop() else {
                    let ty = &frame.matchable.ty;
                    return Err(Error::invalid_state(format!("`{ty}` accepted with no branch open")));
                };
                let parent = self.accept(child)?;
                self.top_mut()?.state = parent;
            }
            Instruction::Reject => match self.top_mut()?.explicit.pop() {
                Some(child) => {
                    let parent = self.reject(child)?;
                    self.top_mut()?.state = parent;
                }
                None => return self.fail_top(),
            },
            Instruction::StartNode { ty, attributes } => self.start_node(ty, attributes)?,
            Instruction::EndNode { ty } => self.end_node(&ty)?,
            Instruction::Reference(reference) => {
                let state = self.top()?.state;
                self.emit_reference(state, &reference)?;
            }
            Instruction::BindAttribute { key, value } => {
                let Some(node) = self.current_mut()?.nodes.back_mut() else {
                    return Err(Error::invalid_state(format!("attribute `{key}` bound outside of a node")));
                };
                node.bound.insert(key, value);
            }
            Instruction::PushLexicalContext(context) => self.current_mut()?.contexts.push_back(context),
            Instruction::PopLexicalContext => {
                let ty = self.top()?.matchable.ty.to_string();
                let state = self.current_mut()?;
                if state.contexts.len() <= 1 {
                    return Err(ErrorKind::ContextUnderflow { ty }.into());
                }
                state.contexts.pop_back();
            }
            Instruction::Resolve(_) => {
                return Err(Error::invalid_state("futures are awaited by the driver"));
            }
        }
        self.resume = Some(Resume::Ack);
        Ok(())
    }

    fn start_node(&mut self, ty: Name, attributes: Attributes) -> Result<()> {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        let root_value = match &self.mode {
            Mode::Build { value } => Some(value.clone()),
            Mode::Parse { .. } => None,
        };
        let current = self.top()?.state;
        let (state, journal) = self.split(current)?;
        if let Some(token) = &state.token {
            return Err(Error::invalid_state(format!("node `{ty}` started inside token `{}`", token.ty)));
        }
        let value = match state.pending.take() {
            Some(pending) => match pending.target {
                Some(Child::Node(node)) => Some(node),
                Some(Child::Token(_)) | None => None,
            },
            None if state.nodes.is_empty() => root_value,
            None => return Err(ErrorKind::UnreferencedNode { ty: ty.to_string() }.into()),
        };
        log::trace!("open {ty} as {id:?}");
        state.nodes.push_back(NodeFrame::new(id, ty.clone(), value.map(ValueCursor::new)));
        journal.push(Tag::Open { ty, attributes });
        Ok(())
    }

    fn end_node(&mut self, ty: &Name) -> Result<()> {
        let current = self.top()?.state;
        let (state, journal) = self.split(current)?;
        let Some(node) = state.nodes.back() else {
            return Err(ErrorKind::NodeMismatch { expected: "<no node>".to_owned(), found: ty.to_string() }.into());
        };
        if node.ty != *ty {
            return Err(ErrorKind::NodeMismatch { expected: node.ty.to_string(), found: ty.to_string() }.into());
        }
        if let Some(pending) = &state.pending {
            return Err(ErrorKind::DanglingReference { path: pending.path.to_string() }.into());
        }
        // Spans opened under this node sit above those of its ancestors.
        let id = node.id;
        if let Some(span) = state.spans.back().filter(|span| span.owner == Some(id)) {
            return Err(ErrorKind::UnclosedSpan { closer: span.closer.to_string() }.into());
        }
        if let Some(node) = state.nodes.pop_back() {
            journal.push(Tag::Close { ty: node.ty, attributes: node.bound });
        }
        Ok(())
    }

    fn emit_reference(&mut self, id: StateId, reference: &Reference) -> Result<()> {
        let (state, journal) = self.split(id)?;
        if let Some(pending) = &state.pending {
            return Err(ErrorKind::DanglingReference { path: pending.path.to_string() }.into());
        }
        if let Some(token) = &state.token {
            return Err(Error::invalid_state(format!("reference `{reference}` inside token `{}`", token.ty)));
        }
        let Some(owner) = state.nodes.back_mut() else {
            return Err(Error::invalid_state(format!("reference `{reference}` outside of a node")));
        };
        let path = owner.resolver.consume(reference);
        let target = owner.value.as_mut().and_then(|value| {
            let target = value.get(&path).cloned();
            value.pass(&path);
            target
        });
        journal.push(Tag::Reference(path.clone()));
        state.pending = Some(PendingRef { path, target });
        Ok(())
    }

    fn open_token(&mut self, id: StateId, matchable: &Matchable) -> Result<()> {
        let language = self.language;
        let build = self.building();
        let state = self.state_mut(id)?;
        let mut reuse = false;
        if build {
            let source = match &state.pending {
                Some(PendingRef { target: Some(Child::Token(literal)), .. }) => Some(literal.text()),
                Some(_) => None,
                None => {
                    let value = state.nodes.back().and_then(|node| node.value.as_ref());
                    let reusable = value.and_then(ValueCursor::next_literal).filter(|literal| {
                        let expected = matchable.props.get("value").and_then(Value::as_str);
                        language.is_a(literal.ty(), &matchable.ty)
                            && expected.is_none_or(|expected| expected == literal.text())
                    });
                    reuse = reusable.is_some();
                    reusable.map(Literal::text)
                }
            };
            state.input = source.map(|text| Cursor::text(text.into()));
        }
        state.token = Some(TokenBuf {
            ty: matchable.ty.clone(),
            text: String::new(),
            balance: matchable.balance.clone(),
            whole: state.input.is_some() && build,
            reuse,
        });
        Ok(())
    }

    /// Emits the token the frame matched. `None` when it must count as a failure.
    fn close_token(&mut self, frame: &Frame) -> Result<Option<String>> {
        let build = self.building();
        let (state, journal) = self.split(frame.state)?;
        let Some(token) = state.token.take() else {
            return Err(Error::invalid_state(format!("token `{}` closed twice", frame.matchable.ty)));
        };
        let consumed = !token.whole || state.input.as_ref().is_some_and(Cursor::is_done);
        if build {
            state.input = None;
        }
        if !consumed || (frame.commits() && !frame.root && token.text.is_empty()) {
            return Ok(None);
        }

        match &token.balance {
            Some(Balance::Open { closer, context }) => {
                let kind = if context.is_some() { SpanKind::Lexical } else { SpanKind::Structural };
                let owner = state.owner();
                state.spans.push_back(Span { kind, closer: Arc::clone(closer), owner });
                if let Some(context) = context {
                    state.contexts.push_back(context.clone());
                }
            }
            Some(Balance::Close) => {
                let Some(span) = state.spans.pop_back() else {
                    let expected = "<no span>".to_owned();
                    return Err(ErrorKind::MismatchedSpan { expected, found: token.text }.into());
                };
                if *span.closer != *token.text {
                    let expected = span.closer.to_string();
                    return Err(ErrorKind::MismatchedSpan { expected, found: token.text }.into());
                }
                if span.kind == SpanKind::Lexical {
                    state.contexts.pop_back();
                }
            }
            None => {}
        }
        if token.reuse {
            if let Some(value) = state.nodes.back_mut().and_then(|node| node.value.as_mut()) {
                value.advance();
            }
        }
        state.pending = None;
        journal.emit_literal(Literal::new(token.ty, token.text.as_str()));
        Ok(Some(token.text))
    }

    fn complete(&mut self) -> Result<()> {
        let frame = self.pop().ok_or_else(|| Error::invalid_state("returned with no production running"))?;
        let ty = frame.matchable.ty.clone();
        if !frame.explicit.is_empty() {
            return Err(ErrorKind::UnbalancedBranch { ty: ty.to_string(), open: frame.explicit.len() }.into());
        }
        let state = self.state(frame.state)?;
        if state.nodes.len() != frame.start.depth {
            let open = state.nodes.back().map_or_else(|| "<no node>".to_owned(), |node| node.ty.to_string());
            return Err(ErrorKind::NodeMismatch { expected: open, found: ty.to_string() }.into());
        }

        let text = match frame.role {
            Role::Token => self.close_token(&frame)?,
            Role::Fragment => {
                let token = state.token.as_ref();
                token.and_then(|token| token.text.get(frame.start.token..)).map(str::to_owned)
            }
            Role::Node | Role::Choice => Some(self.journal.text_since(frame.start.journal).to_owned()),
        };
        let text = match text {
            Some(text) if frame.root || !frame.commits() || !text.is_empty() => text,
            _ => return self.fail(frame, &ty),
        };

        if frame.branched {
            if frame.commits() {
                self.accept(frame.state)?;
            } else {
                self.reject(frame.state)?;
            }
        }
        log::trace!("`{ty}` matched {text:?}");
        if self.frames.is_empty() {
            return self.finish(&ty);
        }
        self.resume = Some(Resume::Matched(Matched::new(ty, text)));
        Ok(())
    }

    fn finish(&mut self, ty: &Name) -> Result<()> {
        let state = self.state(self.root)?;
        if let Some(span) = state.spans.back() {
            return Err(ErrorKind::UnclosedSpan { closer: span.closer.to_string() }.into());
        }
        if let Some(node) = state.nodes.back() {
            return Err(Error::invalid_state(format!("node `{}` was never ended", node.ty)));
        }
        if let Some(pending) = &state.pending {
            return Err(ErrorKind::DanglingReference { path: pending.path.to_string() }.into());
        }
        if state.input.as_ref().is_some_and(|input| !input.is_done()) {
            return Err(ErrorKind::UnconsumedInput { ty: ty.to_string() }.into());
        }
        log::debug!("run of `{}` finished", self.language.name());
        self.finished = true;
        Ok(())
    }

    fn branch(&mut self, parent: StateId) -> Result<StateId> {
        let mark = self.journal.mark();
        let state = self.state_mut(parent)?;
        if state.status != Status::Active {
            return Err(Error::invalid_state(format!("branch from {:?} state {parent:?}", state.status)));
        }
        let child = state.fork(parent, mark);
        let id = self.states.alloc(child);
        if parent == self.root {
            self.floor = Some(mark);
        }
        log::trace!("branch {parent:?} -> {id:?}, {} live", self.states.len());
        Ok(id)
    }

    fn accept(&mut self, id: StateId) -> Result<StateId> {
        let child = self.settle(id)?;
        let parent = child.parent.ok_or_else(|| Error::invalid_state("accepted the root state"))?;
        self.state_mut(parent)?.absorb(child);
        log::trace!("accept {id:?} into {parent:?}");
        Ok(parent)
    }

    fn reject(&mut self, id: StateId) -> Result<StateId> {
        let child = self.settle(id)?;
        let parent = child.parent.ok_or_else(|| Error::invalid_state("rejected the root state"))?;
        self.journal.rollback(child.mark);
        self.state_mut(parent)?.status = Status::Active;
        log::trace!("reject {id:?} back to {parent:?}");
        Ok(parent)
    }

    /// Takes an active, non-root state out of the arena; its handle goes stale.
    fn settle(&mut self, id: StateId) -> Result<State> {
        let status = self.state(id)?.status;
        if id == self.root || status != Status::Active {
            return Err(Error::invalid_state(format!("cannot settle {status:?} state {id:?}")));
        }
        let state = self.states.remove(id).ok_or_else(|| stale(id))?;
        if state.parent == Some(self.root) {
            self.floor = None;
        }
        Ok(state)
    }

    fn building(&self) -> bool {
        matches!(self.mode, Mode::Build { .. })
    }

    fn top(&self) -> Result<&Frame> {
        self.frames.last().ok_or_else(|| Error::invalid_state("no production is running"))
    }

    fn top_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| Error::invalid_state("no production is running"))
    }

    fn state(&self, id: StateId) -> Result<&State> {
        self.states.get(id).ok_or_else(|| stale(id))
    }

    fn state_mut(&mut self, id: StateId) -> Result<&mut State> {
        self.states.get_mut(id).ok_or_else(|| stale(id))
    }

    /// A state together with the journal it writes to.
    fn split(&mut self, id: StateId) -> Result<(&mut State, &mut Journal)> {
        let state = self.states.get_mut(id).ok_or_else(|| stale(id))?;
        Ok((state, &mut self.journal))
    }

    fn current_mut(&mut self) -> Result<&mut State> {
        let id = self.top()?.state;
        self.state_mut(id)
    }

    fn offset(&self) -> Option<TextSize> {
        let id = self.frames.last().map_or(self.root, |frame| frame.state);
        self.offset_of(id)
    }

    /// Byte offset of a state's input position into the parsed text.
    fn offset_of(&self, id: StateId) -> Option<TextSize> {
        let Mode::Parse { text } = &self.mode else { return None };
        let position = self.states.get(id)?.input.as_ref()?.position();
        let offset = text.char_indices().nth(position).map_or(text.len(), |(offset, _)| offset);
        TextSize::try_from(offset).ok()
    }
}

fn stale(id: StateId) -> Error {
    Error::invalid_state(format!("stale state {id:?}"))
}

impl Drop for Engine<'_> {
    fn drop(&mut self) {
        while let Some(mut frame) = self.pop() {
            if let Err(error) = frame.production.force_fail() {
                log::debug!("`{}` failed to clean up: {error}", frame.matchable.ty);
            }
        }
    }
}
