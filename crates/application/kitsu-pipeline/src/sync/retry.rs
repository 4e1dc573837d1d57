use tokio::time::Instant;

/// Tasks parked until the remote quota resets.
///
/// There is no retry cap: a task waits as long as the remote asks.
#[derive(Debug)]
pub struct RetryQueue<T> {
    parked: Vec<(Instant, T)>,
    total_pushed: usize,
}

impl<T> Default for RetryQueue<T> {
    fn default() -> Self {
        Self {
            parked: Vec::new(),
            total_pushed: 0,
        }
    }
}

impl<T> RetryQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: T, resume_after: Instant) {
        self.parked.push((resume_after, task));
        self.total_pushed += 1;
    }

    /// Remove and return every task whose resume time has passed, earliest first.
    pub fn pop_ready(&mut self, now: Instant) -> Vec<T> {
        let (mut ready, parked): (Vec<_>, Vec<_>) =
            self.parked.drain(..).partition(|(at, _)| *at <= now);
        self.parked = parked;
        ready.sort_by_key(|(at, _)| *at);
        ready.into_iter().map(|(_, task)| task).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.parked.iter().map(|(at, _)| *at).min()
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    pub fn total_pushed(&self) -> usize {
        self.total_pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_due_tasks_are_released() {
        let now = Instant::now();
        let mut queue = RetryQueue::new();
        queue.push("late", now + Duration::from_secs(10));
        queue.push("due", now);
        queue.push("earlier", now - Duration::from_secs(1));

        assert_eq!(queue.pop_ready(now), vec!["earlier", "due"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(10)));
        assert_eq!(queue.total_pushed(), 3);
    }
}
