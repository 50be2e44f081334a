//! Productions written as `async` blocks.
//!
//! Each `cx.*().await` suspends the block and hands one instruction to the
//! engine; the engine's answer is what the `await` evaluates to. The block is
//! polled with a no-op waker and must not await anything but [`Cx`] methods.

use std::cell::RefCell;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use quill_cst::{Attributes, Name, Reference, Value};
use quill_errors::{Error, ErrorKind, Result};

use crate::{Effects, Instruction, Invocation, Matchable, Matched, Production, Resume, Step};

#[derive(Default)]
struct Channel {
    outbox: Option<Instruction>,
    inbox: Option<Resume>,
}

/// Handle a scripted production uses to talk to the engine.
pub struct Cx {
    channel: Rc<RefCell<Channel>>,
    invocation: Invocation,
}

struct Suspend {
    channel: Rc<RefCell<Channel>>,
    instruction: Option<Instruction>,
}

impl Future for Suspend {
    type Output = Resume;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Resume> {
        if let Some(instruction) = self.instruction.take() {
            self.channel.borrow_mut().outbox = Some(instruction);
            return Poll::Pending;
        }
        match self.channel.borrow_mut().inbox.take() {
            Some(resume) => Poll::Ready(resume),
            None => Poll::Pending,
        }
    }
}

fn unexpected(instruction: &str, resume: &Resume) -> Error {
    Error::invalid_state(format!("`{instruction}` was answered with {resume:?}"))
}

impl Cx {
    fn suspend(&self, instruction: Instruction) -> Suspend {
        Suspend { channel: Rc::clone(&self.channel), instruction: Some(instruction) }
    }

    async fn ack(&self, instruction: Instruction) -> Result<()> {
        let name = format!("{instruction:?}");
        match self.suspend(instruction).await {
            Resume::Ack => Ok(()),
            other => Err(unexpected(&name, &other)),
        }
    }

    async fn attempt(&self, matchable: Matchable, effects: Effects) -> Result<Option<Matched>> {
        match self.suspend(Instruction::Match(matchable.with_effects(effects))).await {
            Resume::Matched(matched) => Ok(Some(matched)),
            Resume::NoMatch => Ok(None),
            other => Err(unexpected("match", &other)),
        }
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub fn ty(&self) -> &Name {
        self.invocation.ty()
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.invocation.prop(key)
    }

    pub fn prop_str(&self, key: &str) -> Result<&str> {
        self.invocation.prop_str(key)
    }

    pub fn is_root(&self) -> bool {
        self.invocation.is_root()
    }

    /// Matches or fails this production.
    pub async fn eat(&self, matchable: Matchable) -> Result<Matched> {
        match self.attempt(matchable, Effects::EAT).await? {
            Some(matched) => Ok(matched),
            None => Err(Error::invalid_state("`eat` was answered with NoMatch")),
        }
    }

    pub async fn eat_match(&self, matchable: Matchable) -> Result<Option<Matched>> {
        self.attempt(matchable, Effects::EAT_MATCH).await
    }

    /// Looks ahead without consuming anything.
    pub async fn probe(&self, matchable: Matchable) -> Result<Option<Matched>> {
        self.attempt(matchable, Effects::PROBE).await
    }

    /// Fails this production. Use as `return cx.fail().await;`.
    pub async fn fail<T>(&self) -> Result<T> {
        let resume = self.suspend(Instruction::Fail).await;
        Err(unexpected("Fail", &resume))
    }

    pub async fn branch(&self) -> Result<()> {
        self.ack(Instruction::Branch).await
    }

    pub async fn accept(&self) -> Result<()> {
        self.ack(Instruction::Accept).await
    }

    pub async fn reject(&self) -> Result<()> {
        self.ack(Instruction::Reject).await
    }

    pub async fn start_node(&self, ty: impl Into<Name>, attributes: Attributes) -> Result<()> {
        self.ack(Instruction::StartNode { ty: ty.into(), attributes }).await
    }

    pub async fn end_node(&self, ty: impl Into<Name>) -> Result<()> {
        self.ack(Instruction::EndNode { ty: ty.into() }).await
    }

    pub async fn reference(&self, reference: impl Into<Reference>) -> Result<()> {
        self.ack(Instruction::Reference(reference.into())).await
    }

    pub async fn bind_attribute(&self, key: impl Into<Name>, value: impl Into<Value>) -> Result<()> {
        self.ack(Instruction::BindAttribute { key: key.into(), value: value.into() }).await
    }

    pub async fn push_lexical_context(&self, context: impl Into<Name>) -> Result<()> {
        self.ack(Instruction::PushLexicalContext(context.into())).await
    }

    pub async fn pop_lexical_context(&self) -> Result<()> {
        self.ack(Instruction::PopLexicalContext).await
    }

    /// Waits for `future` under the asynchronous driver. A failed future
    /// comes back as [`ErrorKind::Async`] for the production to handle.
    pub async fn resolve<T, E, F>(&self, future: F) -> Result<T>
    where
        T: 'static,
        E: Display,
        F: Future<Output = std::result::Result<T, E>> + 'static,
    {
        let future = Box::pin(async move {
            match future.await {
                Ok(value) => Ok(Box::new(value) as Box<dyn std::any::Any>),
                Err(error) => Err(error.to_string()),
            }
        });
        match self.suspend(Instruction::Resolve(future)).await {
            Resume::Resolved(value) => match value.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(_) => Err(Error::invalid_state("resolved value has an unexpected type")),
            },
            Resume::Unresolved(message) => Err(ErrorKind::Async(message).into()),
            other => Err(unexpected("Resolve", &other)),
        }
    }
}

struct Script {
    ty: Name,
    future: Pin<Box<dyn Future<Output = Result<()>>>>,
    channel: Rc<RefCell<Channel>>,
}

impl Production for Script {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        if !matches!(input, Resume::Start) {
            self.channel.borrow_mut().inbox = Some(input);
        }
        let mut cx = Context::from_waker(Waker::noop());
        match self.future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => result.map(|()| Step::Return),
            Poll::Pending => match self.channel.borrow_mut().outbox.take() {
                Some(instruction) => Ok(Step::Yield(instruction)),
                None => Err(ErrorKind::ForeignAwait { ty: self.ty.to_string() }.into()),
            },
        }
    }

    fn force_fail(&mut self) -> Result<Step> {
        // Dropping the suspended block runs the destructors of its locals.
        self.future = Box::pin(std::future::ready(Ok(())));
        match self.channel.borrow_mut().outbox.take() {
            Some(instruction) => Ok(Step::Yield(instruction)),
            None => Ok(Step::Return),
        }
    }
}

/// Adapts an `async` closure into a production factory.
pub fn script<F, Fut>(body: F) -> impl Fn(Invocation) -> Box<dyn Production> + 'static
where
    F: Fn(Cx) -> Fut + 'static,
    Fut: Future<Output = Result<()>> + 'static,
{
    move |invocation: Invocation| {
        let channel = Rc::new(RefCell::new(Channel::default()));
        let ty = invocation.ty().clone();
        let cx = Cx { channel: Rc::clone(&channel), invocation };
        Box::new(Script { ty, future: Box::pin(body(cx)), channel }) as Box<dyn Production>
    }
}
