//! Display-frame callbacks.
//!
//! Animations never loop on their own: each step asks the host for one more
//! frame and keeps the returned id so the request can be withdrawn. The host
//! (a windowing loop, a browser shell, the headless CLI) decides when a frame
//! fires and calls back into whoever asked with that id.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Handle for one requested frame callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameId(pub u64);

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

pub trait FrameScheduler {
    /// Request a single callback on the next display frame.
    fn request_frame(&self) -> FrameId;

    /// Withdraw a request. Cancelling a frame that already fired is a no-op.
    fn cancel_frame(&self, id: FrameId);
}

impl<F: FrameScheduler + ?Sized> FrameScheduler for Rc<F> {
    fn request_frame(&self) -> FrameId {
        (**self).request_frame()
    }

    fn cancel_frame(&self, id: FrameId) {
        (**self).cancel_frame(id)
    }
}

/// Frames that fire only when the driver says so.
///
/// Clones share one queue, so a test or the headless driver can keep a
/// handle while the controller owns another.
#[derive(Clone, Default)]
pub struct ManualFrames {
    inner: Rc<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    next_id: Cell<u64>,
    pending: RefCell<VecDeque<FrameId>>,
}

impl ManualFrames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the oldest outstanding request, as a vsync would.
    pub fn next_frame(&self) -> Option<FrameId> {
        self.inner.pending.borrow_mut().pop_front()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn is_pending(&self, id: FrameId) -> bool {
        self.inner.pending.borrow().contains(&id)
    }
}

impl FrameScheduler for ManualFrames {
    fn request_frame(&self) -> FrameId {
        let id = FrameId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner.pending.borrow_mut().push_back(id);
        id
    }

    fn cancel_frame(&self, id: FrameId) {
        self.inner.pending.borrow_mut().retain(|&p| p != id);
    }
}

impl fmt::Debug for ManualFrames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualFrames")
            .field("pending", &self.inner.pending.borrow())
            .finish()
    }
}
