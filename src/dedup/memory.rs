use dashmap::DashMap;

/// In-process deduplicator
///
/// Unbounded for the lifetime of the run; the concurrent map keeps workers
/// from serializing on a single lock.
pub struct MemoryDedup {
    set: DashMap<String, ()>,
}

impl MemoryDedup {
    pub fn new() -> Self {
        Self { set: DashMap::new() }
    }

    /// True iff the key was already marked
    pub fn seen(&self, key: &str) -> bool {
        self.set.insert(key.to_string(), ()).is_some()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

impl Default for MemoryDedup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_first_sighting_is_false() {
        let dedup = MemoryDedup::new();
        assert!(!dedup.seen("a"));
    }

    #[test]
    fn test_repeat_sightings_are_true() {
        let dedup = MemoryDedup::new();
        assert!(!dedup.seen("a"));
        assert!(dedup.seen("a"));
        assert!(dedup.seen("a"));
    }

    #[test]
    fn test_keys_are_independent() {
        let dedup = MemoryDedup::new();
        assert!(!dedup.seen("a"));
        assert!(!dedup.seen("b"));
        assert!(dedup.seen("a"));
    }

    #[tokio::test]
    async fn test_concurrent_first_sighting_happens_once() {
        let dedup = Arc::new(MemoryDedup::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let dedup = Arc::clone(&dedup);
            handles.push(tokio::spawn(async move { dedup.seen("contested") }));
        }

        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                fresh += 1;
            }
        }
        // Exactly one caller may observe the key as new
        assert_eq!(fresh, 1);
    }
}
