//! Array Queue
//!
//! FIFO queue over a circular buffer that doubles its capacity when full.

/// Capacity of a freshly created queue
pub const DEFAULT_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct ArrayQueue<T> {
    data: Vec<Option<T>>,
    size: usize,
    front: usize,
}

impl<T> ArrayQueue<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: std::iter::repeat_with(|| None).take(capacity).collect(),
            size: 0,
            front: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Peek at the front element without removing it
    pub fn first(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.data[self.front].as_ref()
    }

    /// Remove and return the front element
    pub fn dequeue(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let answer = self.data[self.front].take();
        self.front = (self.front + 1) % self.data.len();
        self.size -= 1;
        answer
    }

    /// Add an element at the back, growing the buffer if it is full
    pub fn enqueue(&mut self, value: T) {
        if self.size == self.data.len() {
            self.resize(2 * self.data.len());
        }
        let avail = (self.front + self.size) % self.data.len();
        self.data[avail] = Some(value);
        self.size += 1;
    }

    /// Iterate front to back
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let cap = self.data.len();
        (0..self.size).filter_map(move |k| self.data[(self.front + k) % cap].as_ref())
    }

    // cap must be >= len
    fn resize(&mut self, cap: usize) {
        let mut old = std::mem::replace(
            &mut self.data,
            std::iter::repeat_with(|| None).take(cap).collect(),
        );
        let old_cap = old.len();
        let mut walk = self.front;
        for k in 0..self.size {
            self.data[k] = old[walk].take();
            walk = (walk + 1) % old_cap;
        }
        self.front = 0;
    }
}

impl<T> Default for ArrayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dequeue_order() {
        let mut queue = ArrayQueue::new();
        queue.enqueue(5);
        queue.enqueue(3);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.first(), Some(&5));
        assert_eq!(queue.dequeue(), Some(5));
        assert!(!queue.is_empty());
        assert_eq!(queue.dequeue(), Some(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_queue() {
        let mut queue: ArrayQueue<i32> = ArrayQueue::new();
        assert_eq!(queue.first(), None);
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_resize_after_wraparound() {
        let mut queue = ArrayQueue::with_capacity(4);
        for i in 0..4 {
            queue.enqueue(i);
        }
        // Push front past index 0 so the live region wraps
        assert_eq!(queue.dequeue(), Some(0));
        assert_eq!(queue.dequeue(), Some(1));
        queue.enqueue(4);
        queue.enqueue(5);
        assert_eq!(queue.capacity(), 4);

        queue.enqueue(6);
        assert_eq!(queue.capacity(), 8);
        assert_eq!(queue.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4, 5, 6]);

        let drained: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_grows_past_default_capacity() {
        let mut queue = ArrayQueue::new();
        for i in 0..25 {
            queue.enqueue(i);
        }
        assert_eq!(queue.len(), 25);
        assert_eq!(queue.capacity(), 40);
        assert_eq!(queue.first(), Some(&0));
    }
}
