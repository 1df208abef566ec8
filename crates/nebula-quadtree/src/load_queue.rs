//! Three-tier tile load queues, rebuilt by every selection pass.

use std::cmp::Ordering;

use crate::TileKey;

/// Load urgency of a queued tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadPriority {
    /// Needed to render this frame, or blocking refinement.
    High,
    /// Rendering with approximate (upsampled) content, or needed by the camera while culled.
    Medium,
    /// Already rendering; loading only improves future frames.
    Low,
}

impl LoadPriority {
    /// Dispatch order.
    pub const ALL: [LoadPriority; 3] = [LoadPriority::High, LoadPriority::Medium, LoadPriority::Low];
}

/// An entry in a load queue.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QueuedTile {
    pub key: TileKey,
    /// Provider-computed priority within the queue; lower loads first.
    pub load_priority: Option<f64>,
}

/// Queue lengths captured before visiting a subtree, so its loads can be dropped again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueCheckpoint {
    high: usize,
    medium: usize,
    low: usize,
}

/// The High, Medium and Low load queues.
///
/// Entries keep insertion (traversal) order until
/// [`sort_by_load_priority`](Self::sort_by_load_priority) is called.
#[derive(Clone, Debug, Default)]
pub struct TileLoadQueues {
    high: Vec<QueuedTile>,
    medium: Vec<QueuedTile>,
    low: Vec<QueuedTile>,
}

impl TileLoadQueues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tile to the queue for `priority`.
    pub fn push(&mut self, priority: LoadPriority, key: TileKey, load_priority: Option<f64>) {
        self.queue_mut(priority).push(QueuedTile { key, load_priority });
    }

    /// Entries of one queue in dispatch order.
    #[must_use]
    pub fn queue(&self, priority: LoadPriority) -> &[QueuedTile] {
        match priority {
            LoadPriority::High => &self.high,
            LoadPriority::Medium => &self.medium,
            LoadPriority::Low => &self.low,
        }
    }

    fn queue_mut(&mut self, priority: LoadPriority) -> &mut Vec<QueuedTile> {
        match priority {
            LoadPriority::High => &mut self.high,
            LoadPriority::Medium => &mut self.medium,
            LoadPriority::Low => &mut self.low,
        }
    }

    /// Combined number of queued tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which queue holds `key`, if any.
    #[must_use]
    pub fn priority_of(&self, key: &TileKey) -> Option<LoadPriority> {
        LoadPriority::ALL
            .into_iter()
            .find(|&priority| self.queue(priority).iter().any(|entry| entry.key == *key))
    }

    pub fn clear(&mut self) {
        self.high.clear();
        self.medium.clear();
        self.low.clear();
    }

    #[must_use]
    pub fn checkpoint(&self) -> QueueCheckpoint {
        QueueCheckpoint {
            high: self.high.len(),
            medium: self.medium.len(),
            low: self.low.len(),
        }
    }

    /// Drop every entry added since `checkpoint`, returning the dropped keys.
    pub fn rewind(&mut self, checkpoint: QueueCheckpoint) -> Vec<TileKey> {
        let mut dropped = Vec::new();
        for (queue, len) in [
            (&mut self.high, checkpoint.high),
            (&mut self.medium, checkpoint.medium),
            (&mut self.low, checkpoint.low),
        ] {
            if queue.len() > len {
                dropped.extend(queue.drain(len..).map(|entry| entry.key));
            }
        }
        dropped
    }

    /// Stable-sort each queue by ascending load priority. Entries without a
    /// priority keep their relative order behind those that have one.
    pub fn sort_by_load_priority(&mut self) {
        for queue in [&mut self.high, &mut self.medium, &mut self.low] {
            if queue.iter().any(|entry| entry.load_priority.is_some()) {
                queue.sort_by(|a, b| compare_load_priority(a.load_priority, b.load_priority));
            }
        }
    }

    /// All entries, High first, then Medium, then Low.
    pub fn iter_dispatch_order(&self) -> impl Iterator<Item = &QueuedTile> {
        self.high.iter().chain(&self.medium).chain(&self.low)
    }
}

fn compare_load_priority(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: u32) -> TileKey {
        TileKey::new(x, 0, 3)
    }

    #[test]
    fn test_dispatch_order_is_high_medium_low() {
        let mut queues = TileLoadQueues::new();
        queues.push(LoadPriority::Low, key(0), None);
        queues.push(LoadPriority::Medium, key(1), None);
        queues.push(LoadPriority::High, key(2), None);
        queues.push(LoadPriority::High, key(3), None);

        let order: Vec<_> = queues.iter_dispatch_order().map(|e| e.key.x).collect();
        assert_eq!(order, vec![2, 3, 1, 0]);
        assert_eq!(queues.len(), 4);
        assert_eq!(queues.priority_of(&key(1)), Some(LoadPriority::Medium));
        assert_eq!(queues.priority_of(&key(9)), None);
    }

    #[test]
    fn test_rewind_drops_only_later_entries() {
        let mut queues = TileLoadQueues::new();
        queues.push(LoadPriority::High, key(0), None);
        queues.push(LoadPriority::Low, key(1), None);
        let checkpoint = queues.checkpoint();
        queues.push(LoadPriority::High, key(2), None);
        queues.push(LoadPriority::Medium, key(3), None);
        queues.push(LoadPriority::Low, key(4), None);

        let mut dropped = queues.rewind(checkpoint);
        dropped.sort();
        assert_eq!(dropped, vec![key(2), key(3), key(4)]);
        assert_eq!(queues.queue(LoadPriority::High), &[QueuedTile { key: key(0), load_priority: None }]);
        assert!(queues.queue(LoadPriority::Medium).is_empty());
        assert_eq!(queues.queue(LoadPriority::Low).len(), 1);
    }

    #[test]
    fn test_sort_is_stable_and_ascending() {
        let mut queues = TileLoadQueues::new();
        queues.push(LoadPriority::High, key(0), Some(5.0));
        queues.push(LoadPriority::High, key(1), Some(1.0));
        queues.push(LoadPriority::High, key(2), None);
        queues.push(LoadPriority::High, key(3), Some(1.0));
        queues.sort_by_load_priority();

        let order: Vec<_> = queues.queue(LoadPriority::High).iter().map(|e| e.key.x).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_sort_without_priorities_keeps_traversal_order() {
        let mut queues = TileLoadQueues::new();
        for x in [4, 1, 3] {
            queues.push(LoadPriority::Low, key(x), None);
        }
        queues.sort_by_load_priority();
        let order: Vec<_> = queues.queue(LoadPriority::Low).iter().map(|e| e.key.x).collect();
        assert_eq!(order, vec![4, 1, 3]);
    }

    #[test]
    fn test_clear() {
        let mut queues = TileLoadQueues::new();
        queues.push(LoadPriority::Medium, key(0), None);
        queues.clear();
        assert!(queues.is_empty());
    }
}
