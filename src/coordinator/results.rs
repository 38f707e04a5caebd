//! Finished task results with bounded retention.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

use super::task::TaskResult;
use crate::config::ResultRetention;

/// Results keyed by task id. Entries expire after `ttl`; beyond `capacity` the
/// oldest are evicted first. Reads never remove an entry.
pub struct ResultRegistry {
    entries: HashMap<String, (Instant, TaskResult)>,
    order: VecDeque<String>,
    ttl: Duration,
    capacity: usize,
}

impl ResultRegistry {
    pub fn new(retention: ResultRetention) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            ttl: retention.ttl,
            capacity: retention.capacity.max(1),
        }
    }

    pub fn insert(&mut self, result: TaskResult) {
        self.insert_at(result, Instant::now());
    }

    pub fn get(&mut self, task_id: &str) -> Option<&TaskResult> {
        self.get_at(task_id, Instant::now())
    }

    pub(crate) fn insert_at(&mut self, result: TaskResult, now: Instant) {
        self.expire(now);
        let task_id = result.task_id.clone();
        if self.entries.insert(task_id.clone(), (now, result)).is_some() {
            self.order.retain(|id| id != &task_id);
        }
        self.order.push_back(task_id);

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                debug!(task_id = %oldest, "Evicting task result (capacity)");
                self.entries.remove(&oldest);
            }
        }
    }

    pub(crate) fn get_at(&mut self, task_id: &str, now: Instant) -> Option<&TaskResult> {
        self.expire(now);
        self.entries.get(task_id).map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries older than the TTL. Insertion order is also age order.
    fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.order.front() {
            let expired = self
                .entries
                .get(oldest)
                .is_none_or(|(at, _)| now.saturating_duration_since(*at) >= self.ttl);
            if !expired {
                break;
            }
            if let Some(id) = self.order.pop_front() {
                debug!(task_id = %id, "Evicting task result (expired)");
                self.entries.remove(&id);
            }
        }
    }
}
