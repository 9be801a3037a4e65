/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Solver behaviors and trace callbacks, kept apart from [`crate::context::SyncCore`]
//! so a behavior can borrow the core mutably while it runs.

use crate::sync::{ClusterId, ObjId, SyncBehavior};
use crate::time::Time;

/// Passed to pass-trace callbacks after every complete cluster pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassInfo {
    pub cluster: ClusterId,
    pub object: String,
    /// Start of the period that just finished.
    pub start: Time,
    pub period: Time,
    /// 1-based pass number.
    pub pass: u64,
}

/// One value emitted by a solver through `ProcessingContext::trace`.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRecord {
    pub cluster: ClusterId,
    pub object: String,
    pub name: String,
    pub time: Time,
    pub value: f64,
}

pub type PassTrace = Box<dyn FnMut(&PassInfo)>;
pub type TraceSink = Box<dyn FnMut(&TraceRecord)>;

#[derive(Default)]
pub struct Hooks {
    /// Indexed by [`ObjId`].
    pub(crate) behaviors: Vec<Option<Box<dyn SyncBehavior>>>,
    pub(crate) pass_traces: Vec<(ObjId, PassTrace)>,
    pub(crate) trace_sinks: Vec<TraceSink>,
}

impl Hooks {
    pub(crate) fn set_behavior(&mut self, obj: ObjId, behavior: Box<dyn SyncBehavior>) {
        if self.behaviors.len() <= obj.0 {
            self.behaviors.resize_with(obj.0 + 1, || None);
        }
        self.behaviors[obj.0] = Some(behavior);
    }

    /// Temporarily take a behavior out so it can run against the core.
    pub(crate) fn take(&mut self, obj: ObjId) -> Option<Box<dyn SyncBehavior>> {
        self.behaviors.get_mut(obj.0).and_then(Option::take)
    }

    pub(crate) fn put_back(&mut self, obj: ObjId, behavior: Box<dyn SyncBehavior>) {
        if let Some(slot) = self.behaviors.get_mut(obj.0) {
            *slot = Some(behavior);
        }
    }

    pub(crate) fn behaviors_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn SyncBehavior>> {
        self.behaviors.iter_mut().flatten()
    }

    /// Run the pass traces registered for any of `members`.
    pub(crate) fn run_pass_traces(&mut self, members: &[ObjId], info: impl Fn(ObjId) -> PassInfo) {
        for (obj, trace) in self.pass_traces.iter_mut() {
            if members.contains(obj) {
                trace(&info(*obj));
            }
        }
    }

    pub(crate) fn flush_traces(&mut self, records: &[TraceRecord]) {
        for sink in self.trace_sinks.iter_mut() {
            for record in records {
                sink(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::error::StepError;
    use crate::processing::ProcessingContext;

    struct Idle;

    impl SyncBehavior for Idle {
        fn processing(&mut self, _ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
            Ok(())
        }
    }

    #[test]
    fn take_and_put_back() {
        let mut hooks = Hooks::default();
        hooks.set_behavior(ObjId(2), Box::new(Idle));
        assert!(hooks.take(ObjId(0)).is_none());
        let b = hooks.take(ObjId(2)).unwrap();
        assert!(hooks.take(ObjId(2)).is_none());
        hooks.put_back(ObjId(2), b);
        assert_eq!(hooks.behaviors_mut().count(), 1);
    }

    #[test]
    fn pass_traces_only_fire_for_members() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = Hooks::default();
        for obj in [ObjId(0), ObjId(5)] {
            let seen = Rc::clone(&seen);
            hooks
                .pass_traces
                .push((obj, Box::new(move |info: &PassInfo| seen.borrow_mut().push(info.object.clone()))));
        }
        hooks.run_pass_traces(&[ObjId(0)], |obj| PassInfo {
            cluster: ClusterId(0),
            object: format!("o{}", obj.0),
            start: Time::ZERO,
            period: Time::from_ticks(10),
            pass: 1,
        });
        assert_eq!(*seen.borrow(), vec!["o0".to_string()]);
    }
}
