//! Fixed-capacity FIFO backlog for pending tasks.

/// A bounded ring buffer. This is what keeps memory use bounded under
/// overload: once full, admission must either grow the worker set or
/// reject the task.
///
/// Not internally synchronized. Every access goes through the pool lock,
/// which also provides the condition variable that blocked workers wait on.
pub(crate) struct BoundedQueue<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> BoundedQueue<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "queue capacity is validated at pool construction");

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    /// Appends to the tail, handing the value back if the queue is full.
    pub(crate) fn push_back(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }

        let tail = (self.head + self.len) % self.slots.len();
        self.slots[tail] = Some(value);
        self.len += 1;
        Ok(())
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let value = self.slots[self.head].take();
        debug_assert!(value.is_some(), "occupied slot within len must hold a value");

        self.head = (self.head + 1) % self.slots.len();
        self.len -= 1;
        value
    }

    /// Removes and returns everything still queued, front first.
    pub(crate) fn drain_pending(&mut self) -> Vec<T> {
        let mut pending = Vec::with_capacity(self.len);
        while let Some(value) = self.pop_front() {
            pending.push(value);
        }
        pending
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let queue = BoundedQueue::<u32>::with_capacity(4);

        assert!(queue.is_empty());
        assert!(!queue.is_full());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.capacity(), 4);
    }

    #[test]
    fn preserves_fifo_order() {
        let mut queue = BoundedQueue::with_capacity(3);

        queue.push_back(1).unwrap();
        queue.push_back(2).unwrap();
        queue.push_back(3).unwrap();

        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), Some(2));
        assert_eq!(queue.pop_front(), Some(3));
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn rejects_when_full() {
        let mut queue = BoundedQueue::with_capacity(2);

        queue.push_back(1).unwrap();
        queue.push_back(2).unwrap();

        assert!(queue.is_full());
        assert_eq!(queue.push_back(3), Err(3));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn wraps_around_the_backing_buffer() {
        let mut queue = BoundedQueue::with_capacity(2);

        for round in 0..10 {
            queue.push_back(round).unwrap();
            queue.push_back(round + 100).unwrap();

            assert_eq!(queue.pop_front(), Some(round));
            assert_eq!(queue.pop_front(), Some(round + 100));
        }

        assert!(queue.is_empty());
    }

    #[test]
    fn drain_returns_remaining_in_order() {
        let mut queue = BoundedQueue::with_capacity(4);

        queue.push_back("a").unwrap();
        queue.push_back("b").unwrap();
        queue.push_back("c").unwrap();
        assert_eq!(queue.pop_front(), Some("a"));

        assert_eq!(queue.drain_pending(), vec!["b", "c"]);
        assert!(queue.is_empty());
    }
}
