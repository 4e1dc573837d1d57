use std::collections::HashSet;
use std::hash::Hash;

/// Work set of the page crawler.
///
/// `to_visit` and `visited` never overlap; anything already visited in this
/// pass is never queued again.
#[derive(Debug, Clone)]
pub struct SyncFrontier<K: Eq + Hash + Clone> {
    to_visit: HashSet<K>,
    visited: HashSet<K>,
    found: HashSet<K>,
}

impl<K: Eq + Hash + Clone> SyncFrontier<K> {
    pub fn new(seed: K) -> Self {
        Self {
            to_visit: HashSet::from([seed]),
            visited: HashSet::new(),
            found: HashSet::new(),
        }
    }

    pub fn has_unvisited(&self) -> bool {
        !self.to_visit.is_empty()
    }

    /// Take the current round. The returned keys count as visited from now on.
    pub fn claim(&mut self) -> Vec<K> {
        let round: Vec<K> = self.to_visit.drain().collect();
        self.visited.extend(round.iter().cloned());
        round
    }

    pub fn discover(&mut self, key: K) {
        if !self.visited.contains(&key) {
            self.found.insert(key);
        }
    }

    /// Next round = everything discovered that has not been visited yet.
    pub fn balance(&mut self) {
        self.visited.extend(self.to_visit.drain());
        self.to_visit = self
            .found
            .drain()
            .filter(|k| !self.visited.contains(k))
            .collect();
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn is_visited(&self, key: &K) -> bool {
        self.visited.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visited_keys_are_never_requeued() {
        let mut frontier = SyncFrontier::new("root");
        assert_eq!(frontier.claim(), vec!["root"]);
        frontier.discover("a");
        frontier.discover("root");
        frontier.balance();
        assert_eq!(frontier.claim(), vec!["a"]);

        frontier.discover("a");
        frontier.discover("root");
        frontier.balance();
        assert!(!frontier.has_unvisited());
        assert_eq!(frontier.visited_count(), 2);
    }

    #[test]
    fn sets_stay_disjoint() {
        let mut frontier = SyncFrontier::new(0u32);
        for round in 0..4u32 {
            let claimed = frontier.claim();
            for k in claimed {
                frontier.discover(k + 1);
                frontier.discover(k);
            }
            frontier.balance();
            for k in frontier.to_visit.iter() {
                assert!(!frontier.visited.contains(k), "round {round}");
            }
        }
    }
}
