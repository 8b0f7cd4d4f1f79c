//! A single priority-tier job queue (§4.A): an ordered waiting list plus
//! a running set, parameterized by name and capacity.

use std::collections::VecDeque;

use dispatcher_core::{ContainerInput, DelivId};

/// Error returned by queue operations whose preconditions were violated
/// ("fails only on internal corruption" / "fails if empty") — these should
/// never trigger in correctly-driven code, hence a single opaque variant
/// rather than a rich enum.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct QueueError(pub String);

/// The `(commitURL, delivId)` key queues use for membership checks.
pub type QueueKey = (String, DelivId);

/// One priority tier: a FIFO waiting list plus a running set, bounded by
/// `capacity` concurrently-running jobs.
#[derive(Debug)]
pub struct JobQueue {
    name: &'static str,
    capacity: usize,
    waiting: VecDeque<ContainerInput>,
    running: Vec<(QueueKey, ContainerInput)>,
}

impl JobQueue {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self { name, capacity, waiting: VecDeque::new(), running: Vec::new() }
    }

    pub fn get_name(&self) -> &'static str {
        self.name
    }

    fn contains_key(&self, key: &QueueKey) -> bool {
        self.waiting.iter().any(|i| &i.queue_key() == key)
            || self.running.iter().any(|(k, _)| k == key)
    }

    /// Append to waiting. No-op if the `(commitURL, delivId)` pair is
    /// already present in waiting or running.
    pub fn push(&mut self, input: ContainerInput) {
        let key = input.queue_key();
        if self.contains_key(&key) {
            return;
        }
        self.waiting.push_back(input);
    }

    /// Insert at the head of waiting (used by cross-tier promotion to
    /// preserve arrival priority). Same dedup rule as `push`.
    pub fn push_first(&mut self, input: ContainerInput) {
        let key = input.queue_key();
        if self.contains_key(&key) {
            return;
        }
        self.waiting.push_front(input);
    }

    /// Remove and return the head of waiting.
    pub fn pop(&mut self) -> Result<ContainerInput, QueueError> {
        self.waiting
            .pop_front()
            .ok_or_else(|| QueueError(format!("{}: waiting queue is empty", self.name)))
    }

    /// Pop the head, insert into running, and return it. Precondition:
    /// waiting is non-empty and `running.len() < capacity`.
    pub fn schedule_next(&mut self) -> Result<ContainerInput, QueueError> {
        if !self.has_capacity() {
            return Err(QueueError(format!("{}: no free slot", self.name)));
        }
        let input = self.pop()?;
        self.running.push((input.queue_key(), input.clone()));
        Ok(input)
    }

    pub fn has_capacity(&self) -> bool {
        self.running.len() < self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Every key currently held, waiting or running, for cross-queue
    /// membership checks.
    pub fn all_keys(&self) -> Vec<QueueKey> {
        self.waiting
            .iter()
            .map(|i| i.queue_key())
            .chain(self.running.iter().map(|(k, _)| k.clone()))
            .collect()
    }

    pub fn length(&self) -> usize {
        self.waiting.len()
    }

    pub fn num_running(&self) -> usize {
        self.running.len()
    }

    /// Position of `commit_url` in the waiting list, or `-1`.
    pub fn index_of(&self, commit_url: &str) -> i64 {
        self.waiting
            .iter()
            .position(|i| i.target.commit_url == commit_url)
            .map(|p| p as i64)
            .unwrap_or(-1)
    }

    /// Remove from waiting (not running) by commit URL.
    pub fn remove(&mut self, commit_url: &str) -> Option<ContainerInput> {
        let pos = self.waiting.iter().position(|i| i.target.commit_url == commit_url)?;
        self.waiting.remove(pos)
    }

    pub fn is_commit_executing(&self, commit_url: &str, deliv_id: &DelivId) -> bool {
        let key = (commit_url.to_string(), deliv_id.clone());
        self.running.iter().any(|(k, _)| k == &key)
    }

    /// Remove from running. Idempotent.
    pub fn clear_execution(&mut self, commit_url: &str, deliv_id: &DelivId) {
        let key = (commit_url.to_string(), deliv_id.clone());
        self.running.retain(|(k, _)| k != &key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn input(commit_url: &str, deliv_id: &str) -> ContainerInput {
        ContainerInput {
            target: dispatcher_core::CommitTarget {
                commit_sha: format!("sha-{commit_url}"),
                commit_url: commit_url.to_string(),
                repo_id: "repo".to_string(),
                deliv_id: DelivId::new(deliv_id),
                postback_url: "EMPTY".to_string(),
                timestamp: chrono::Utc::now(),
            },
            image: "image:latest".to_string(),
            timeout: Duration::from_secs(60),
            params: Default::default(),
        }
    }

    #[test]
    fn push_is_idempotent_for_the_same_key() {
        let mut q = JobQueue::new("standard", 2);
        q.push(input("c1", "d0"));
        q.push(input("c1", "d0"));
        assert_eq!(q.length(), 1);
    }

    #[test]
    fn schedule_next_respects_capacity() {
        let mut q = JobQueue::new("express", 1);
        q.push(input("c1", "d0"));
        q.push(input("c2", "d0"));

        assert!(q.has_capacity());
        q.schedule_next().unwrap();
        assert!(!q.has_capacity());
        assert!(q.schedule_next().is_err());
        assert_eq!(q.length(), 1);
    }

    #[test]
    fn push_rejects_duplicate_already_running() {
        let mut q = JobQueue::new("standard", 2);
        q.push(input("c1", "d0"));
        q.schedule_next().unwrap();
        q.push(input("c1", "d0"));
        assert_eq!(q.length(), 0);
        assert_eq!(q.num_running(), 1);
    }

    #[test]
    fn remove_only_touches_waiting() {
        let mut q = JobQueue::new("standard", 2);
        q.push(input("c1", "d0"));
        q.schedule_next().unwrap();
        q.push(input("c2", "d0"));

        assert!(q.remove("c1").is_none());
        assert!(q.remove("c2").is_some());
        assert_eq!(q.length(), 0);
        assert_eq!(q.num_running(), 1);
    }

    #[test]
    fn clear_execution_is_idempotent() {
        let mut q = JobQueue::new("standard", 2);
        q.push(input("c1", "d0"));
        q.schedule_next().unwrap();
        let deliv = DelivId::new("d0");
        q.clear_execution("c1", &deliv);
        assert_eq!(q.num_running(), 0);
        q.clear_execution("c1", &deliv);
        assert_eq!(q.num_running(), 0);
    }

    #[test]
    fn index_of_reflects_fifo_position() {
        let mut q = JobQueue::new("standard", 2);
        q.push(input("c1", "d0"));
        q.push(input("c2", "d0"));
        assert_eq!(q.index_of("c1"), 0);
        assert_eq!(q.index_of("c2"), 1);
        assert_eq!(q.index_of("missing"), -1);
    }
}
