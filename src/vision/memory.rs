//! Detection Memory
//!
//! Names of the cards already confirmed this round. Shared by every match
//! worker of a scan; all check-then-insert sequences go through one lock.

use parking_lot::Mutex;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct DetectionMemory {
    seen: Mutex<HashSet<String>>,
}

impl DetectionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` has already been confirmed
    pub fn contains(&self, name: &str) -> bool {
        self.seen.lock().contains(name)
    }

    /// Record `name`, returning `false` if it was already present
    pub fn try_insert(&self, name: &str) -> bool {
        let mut seen = self.seen.lock();
        if seen.contains(name) {
            return false;
        }
        seen.insert(name.to_string())
    }

    /// Number of confirmed cards
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Copy of the confirmed names
    pub fn snapshot(&self) -> HashSet<String> {
        self.seen.lock().clone()
    }

    /// Forget everything (new round)
    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_try_insert_once() {
        let memory = DetectionMemory::new();
        assert!(memory.try_insert("Hearts Ace"));
        assert!(!memory.try_insert("Hearts Ace"));
        assert!(memory.contains("Hearts Ace"));
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_clear() {
        let memory = DetectionMemory::new();
        memory.try_insert("a");
        memory.try_insert("b");
        memory.clear();
        assert_eq!(memory.len(), 0);
        assert!(!memory.contains("a"));
    }

    #[test]
    fn test_concurrent_insert_single_winner() {
        let memory = Arc::new(DetectionMemory::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let memory = memory.clone();
                std::thread::spawn(move || memory.try_insert("Spades Queen"))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(memory.len(), 1);
    }
}
