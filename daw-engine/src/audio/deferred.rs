/// Parameter updates held until the rendering context exists
///
/// One entry per target; a newer value for the same target replaces the
/// older one and moves to the back, so draining replays the last write for
/// each target in the order those last writes happened.
#[derive(Debug, Clone)]
pub struct DeferredQueue<K, V> {
    entries: Vec<(K, V)>,
}

impl<K, V> Default for DeferredQueue<K, V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<K: PartialEq, V> DeferredQueue<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: K, value: V) {
        self.entries.retain(|(k, _)| *k != key);
        self.entries.push((key, value));
    }

    /// Drop the pending value for a target, if any
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Remove every entry matching `pred`
    pub fn remove_where(&mut self, mut pred: impl FnMut(&K) -> bool) {
        self.entries.retain(|(k, _)| !pred(k));
    }

    /// Take all pending entries in order
    pub fn drain(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins_in_order() {
        let mut queue = DeferredQueue::new();
        queue.push("a", 1);
        queue.push("b", 2);
        queue.push("a", 3);

        assert_eq!(queue.drain(), vec![("b", 2), ("a", 3)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_where() {
        let mut queue = DeferredQueue::new();
        queue.push((1, 'e'), ());
        queue.push((1, 'r'), ());
        queue.push((2, 'e'), ());

        queue.remove_where(|(track, _)| *track == 1);

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.remove(&(2, 'e')), Some(()));
    }
}
