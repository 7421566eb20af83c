//! Task bookkeeping behind the progress endpoint.
//!
//! A task is queued when its request arrives, becomes current once it holds
//! the GPU lock, and is remembered as finished afterwards. Only the most
//! recent finished ids are kept.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use indexmap::IndexMap;

/// How many finished task ids are remembered.
const FINISHED_CAPACITY: usize = 16;

/// Where a task currently stands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskStatus {
    Unknown,
    Queued { position: usize },
    Active { elapsed_secs: f64 },
    Finished,
}

#[derive(Debug, Default)]
struct Inner {
    queued: IndexMap<String, Instant>,
    current: Option<(String, Instant)>,
    finished: VecDeque<String>,
}

/// Registry of queued, running and recently finished tasks.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    inner: Mutex<Inner>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn add_task_to_queue(&self, id_task: &str) {
        self.with(|inner| {
            inner.queued.insert(id_task.to_string(), Instant::now());
        });
    }

    pub fn start_task(&self, id_task: &str) {
        self.with(|inner| {
            inner.queued.shift_remove(id_task);
            inner.current = Some((id_task.to_string(), Instant::now()));
        });
    }

    pub fn finish_task(&self, id_task: &str) {
        self.with(|inner| {
            inner.queued.shift_remove(id_task);
            if inner.current.as_ref().is_some_and(|(id, _)| id == id_task) {
                inner.current = None;
            }
            if inner.finished.len() >= FINISHED_CAPACITY {
                inner.finished.pop_front();
            }
            inner.finished.push_back(id_task.to_string());
        });
    }

    pub fn status(&self, id_task: &str) -> TaskStatus {
        self.with(|inner| {
            if let Some((_, started)) = inner.current.as_ref().filter(|(id, _)| id == id_task) {
                return TaskStatus::Active {
                    elapsed_secs: started.elapsed().as_secs_f64(),
                };
            }
            if let Some(position) = inner.queued.get_index_of(id_task) {
                return TaskStatus::Queued { position };
            }
            if inner.finished.iter().any(|id| id == id_task) {
                return TaskStatus::Finished;
            }
            TaskStatus::Unknown
        })
    }

    pub fn current_task(&self) -> Option<String> {
        self.with(|inner| inner.current.as_ref().map(|(id, _)| id.clone()))
    }

    pub fn queued_len(&self) -> usize {
        self.with(|inner| inner.queued.len())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn task_moves_through_states() {
        let registry = TaskRegistry::new();
        assert_eq!(registry.status("a"), TaskStatus::Unknown);

        registry.add_task_to_queue("a");
        registry.add_task_to_queue("b");
        assert_eq!(registry.status("b"), TaskStatus::Queued { position: 1 });

        registry.start_task("a");
        assert_matches!(registry.status("a"), TaskStatus::Active { .. });
        assert_eq!(registry.status("b"), TaskStatus::Queued { position: 0 });
        assert_eq!(registry.current_task().as_deref(), Some("a"));

        registry.finish_task("a");
        assert_eq!(registry.status("a"), TaskStatus::Finished);
        assert_eq!(registry.current_task(), None);
    }

    #[test]
    fn finished_list_is_bounded() {
        let registry = TaskRegistry::new();
        for i in 0..=FINISHED_CAPACITY {
            registry.finish_task(&format!("t{i}"));
        }
        assert_eq!(registry.status("t0"), TaskStatus::Unknown);
        assert_eq!(
            registry.status(&format!("t{FINISHED_CAPACITY}")),
            TaskStatus::Finished
        );
    }

    #[test]
    fn finishing_other_task_keeps_current() {
        let registry = TaskRegistry::new();
        registry.start_task("a");
        registry.finish_task("b");
        assert_eq!(registry.current_task().as_deref(), Some("a"));
    }
}
