use lru::LruCache;

use super::FrameId;

/// Victim-selection policy over the set of evictable frames.
///
/// The buffer manager calls `pin` when a frame gains its first pin and
/// `unpin` when the pin count drops back to zero; `victim` picks a frame to
/// evict, or `None` when every frame is pinned.
pub trait Replacer: Send {
    /// Remove and return the next eviction victim
    fn victim(&mut self) -> Option<FrameId>;

    /// Remove a frame from the evictable set
    fn pin(&mut self, frame: FrameId);

    /// Add a frame to the evictable set; refreshes recency if present
    fn unpin(&mut self, frame: FrameId);

    /// Number of evictable frames
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// LRU eviction policy
pub struct LruReplacer {
    frames: LruCache<FrameId, ()>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self {
            frames: LruCache::unbounded(),
        }
    }
}

impl Default for LruReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        self.frames.pop_lru().map(|(frame, ())| frame)
    }

    fn pin(&mut self, frame: FrameId) {
        self.frames.pop(&frame);
    }

    fn unpin(&mut self, frame: FrameId) {
        self.frames.put(frame, ());
    }

    fn len(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order_is_lru() {
        let mut replacer = LruReplacer::new();

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        assert_eq!(replacer.len(), 3);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_unpin_refreshes_recency() {
        let mut replacer = LruReplacer::new();

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(1);

        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_pin_removes_from_set() {
        let mut replacer = LruReplacer::new();

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.pin(1);

        assert_eq!(replacer.len(), 1);
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }
}
