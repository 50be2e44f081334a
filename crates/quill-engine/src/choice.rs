use quill_cst::Name;
use quill_errors::Result;

use crate::{Effects, Instruction, Matchable, Production, Resume, Step};

/// Stands in for an alias without a production of its own: tries each covered
/// type in order and succeeds with the first that matches.
pub(crate) struct Choice {
    template: Matchable,
    candidates: Vec<Name>,
    next: usize,
}

impl Choice {
    pub(crate) fn new(template: Matchable, candidates: Vec<Name>) -> Self {
        Self { template, candidates, next: 0 }
    }
}

impl Production for Choice {
    fn resume(&mut self, input: Resume) -> Result<Step> {
        if let Resume::Matched(_) = input {
            return Ok(Step::Return);
        }
        let Some(candidate) = self.candidates.get(self.next) else {
            return Ok(Step::Yield(Instruction::Fail));
        };
        self.next += 1;
        let matchable = self.template.clone().with_ty(candidate.clone()).with_effects(Effects::EAT_MATCH);
        Ok(Step::Yield(Instruction::Match(matchable)))
    }
}
