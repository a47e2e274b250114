//! Reactive Context
//!
//! The reactive context tracks which computation is currently running, so
//! that a read can register the running computation as a dependent.
//!
//! # Implementation
//!
//! Each runtime owns one [`ContextStack`]. Evaluating a computed, running a
//! watch's tracking function, or entering [`Runtime::untracked`] pushes a
//! [`Frame`] through a [`ContextGuard`], which pops it again on drop. Nested
//! evaluations therefore attribute their reads to the innermost computation and
//! restore the outer one afterwards, even when a getter panics.
//!
//! [`Runtime::untracked`]: super::Runtime::untracked

use std::cell::RefCell;

use crate::graph::SubscriberId;

/// One entry of the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Reads register edges toward this subscriber.
    Tracking(SubscriberId),
    /// Reads register nothing.
    Untracked,
}

/// Stack of currently running computations, outermost first.
#[derive(Debug, Default)]
pub(crate) struct ContextStack {
    frames: RefCell<Vec<Frame>>,
}

impl ContextStack {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, frame: Frame) {
        self.frames.borrow_mut().push(frame);
    }

    /// Pop the top frame.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty.
    pub(crate) fn pop(&self) -> Frame {
        match self.frames.borrow_mut().pop() {
            Some(frame) => frame,
            None => panic!("reactive context stack underflow: pop without a matching push"),
        }
    }

    /// Push `frame` for as long as the returned guard lives.
    pub(crate) fn enter(&self, frame: Frame) -> ContextGuard<'_> {
        self.push(frame);
        ContextGuard { stack: self, frame }
    }

    /// The subscriber that should receive edges right now, if any.
    pub(crate) fn current(&self) -> Option<SubscriberId> {
        match self.frames.borrow().last() {
            Some(Frame::Tracking(id)) => Some(*id),
            Some(Frame::Untracked) | None => None,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

/// Pops its frame when dropped.
pub(crate) struct ContextGuard<'a> {
    stack: &'a ContextStack,
    frame: Frame,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // A second panic here would abort; just unwind the frame.
            self.stack.frames.borrow_mut().pop();
            return;
        }
        let popped = self.stack.pop();
        assert_eq!(popped, self.frame, "reactive context mismatch");
    }
}
