use crate::op::Op;
use std::fmt;
use std::ptr::NonNull;

/// An intrusive FIFO of operations.
///
/// The link lives inside each [`Op`], so pushing, popping and splicing a
/// whole queue onto another are all O(1). Splicing is what makes the
/// two-level queue design work: a worker's private queue is published to the
/// global queue in a single pointer exchange, never a per-element copy.
pub struct OpQueue {
    head: Option<Box<Op>>,

    /// Raw cursor to the last node. Only dereferenced while that node is
    /// owned by this queue.
    tail: Option<NonNull<Op>>,
}

// Safety: the queue owns every node reachable from `head`, and `tail` always
// points into that chain (or is None). Ownership of the nodes moves with the
// queue itself.
unsafe impl Send for OpQueue {}

impl OpQueue {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn front(&self) -> Option<&Op> {
        self.head.as_deref()
    }

    pub fn push(&mut self, mut op: Box<Op>) {
        debug_assert!(op.next.is_none(), "operation already linked");

        let raw = NonNull::from(&mut *op);
        match self.tail {
            // Safety: `tail` is a node owned by this queue.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(op) },
            None => self.head = Some(op),
        }
        self.tail = Some(raw);
    }

    pub fn pop(&mut self) -> Option<Box<Op>> {
        let mut op = self.head.take()?;
        self.head = op.next.take();
        if self.head.is_none() {
            self.tail = None;
        }
        Some(op)
    }

    /// Splice all of `other` onto the tail of `self`, leaving `other` empty.
    pub fn push_queue(&mut self, other: &mut OpQueue) {
        if other.head.is_none() {
            return;
        }

        let other_head = other.head.take();
        match self.tail {
            // Safety: `tail` is a node owned by this queue.
            Some(tail) => unsafe { (*tail.as_ptr()).next = other_head },
            None => self.head = other_head,
        }
        self.tail = other.tail.take();
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for OpQueue {
    fn drop(&mut self) {
        // Unlink iteratively. Dropping the head box directly would recurse
        // through the whole chain and can blow the stack on long queues.
        while self.pop().is_some() {}
    }
}

impl fmt::Debug for OpQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpQueue")
            .field("is_empty", &self.is_empty())
            .finish_non_exhaustive()
    }
}
