use std::rc::Rc;

use quill_cst::{Attributes, Name, Value};
use quill_errors::{Error, Result};

use crate::{Resume, Step};

/// A resumable matcher for one grammar type.
///
/// The engine calls `resume` with the answer to the previously yielded
/// instruction until the production returns. A production abandoned halfway
/// gets `force_fail` instead, and must clean up without yielding.
pub trait Production {
    fn resume(&mut self, input: Resume) -> Result<Step>;

    fn force_fail(&mut self) -> Result<Step> {
        Ok(Step::Return)
    }
}

/// Creates a fresh production for each attempt.
pub type Factory = Rc<dyn Fn(Invocation) -> Box<dyn Production>>;

/// What a production was invoked with.
#[derive(Debug, Clone)]
pub struct Invocation {
    ty: Name,
    props: Attributes,
    root: bool,
}

impl Invocation {
    pub(crate) fn new(ty: Name, props: Attributes, root: bool) -> Self {
        Self { ty, props, root }
    }

    pub fn ty(&self) -> &Name {
        &self.ty
    }

    pub fn props(&self) -> &Attributes {
        &self.props
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// A string prop the production cannot do without.
    pub fn prop_str(&self, key: &str) -> Result<&str> {
        self.prop(key)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::script(format!("`{}` needs a string `{key}` prop", self.ty)))
    }

    pub fn is_root(&self) -> bool {
        self.root
    }
}
