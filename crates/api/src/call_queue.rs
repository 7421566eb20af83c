//! Generation queue.
//!
//! Up to [`QUEUE_CONCURRENCY`] requests may be admitted at once; the rest wait
//! for a permit. Admitted requests then run one at a time behind the GPU
//! lock. Every request is tracked in the [`TaskRegistry`] from arrival until
//! it finishes, fails, or is dropped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::error::AppError;
use crate::tasks::TaskRegistry;

/// Requests admitted concurrently when queuing is enabled.
pub const QUEUE_CONCURRENCY: usize = 64;

pub struct GenerationQueue {
    /// `None` when queuing is disabled (`--no-gradio-queue`).
    permits: Option<Semaphore>,
    gpu_lock: Mutex<()>,
    tasks: Arc<TaskRegistry>,
}

impl GenerationQueue {
    pub fn new(enabled: bool, tasks: Arc<TaskRegistry>) -> Self {
        Self {
            permits: enabled.then(|| Semaphore::new(QUEUE_CONCURRENCY)),
            gpu_lock: Mutex::new(()),
            tasks,
        }
    }

    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    pub fn is_enabled(&self) -> bool {
        self.permits.is_some()
    }

    /// Free admission slots, or `None` when queuing is disabled.
    pub fn available_permits(&self) -> Option<usize> {
        self.permits.as_ref().map(Semaphore::available_permits)
    }

    /// Stop admitting requests. Waiting requests fail with
    /// [`AppError::Unavailable`].
    pub fn close(&self) {
        if let Some(permits) = &self.permits {
            permits.close();
        }
    }

    /// Run `job` for `id_task` once it is admitted and holds the GPU lock.
    pub async fn run<F, T>(&self, id_task: &str, job: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        self.tasks.add_task_to_queue(id_task);
        let _finish = FinishOnDrop {
            tasks: &self.tasks,
            id_task,
        };

        let _permit = match &self.permits {
            Some(permits) => Some(
                permits
                    .acquire()
                    .await
                    .map_err(|_| AppError::Unavailable("Generation queue is closed".into()))?,
            ),
            None => None,
        };

        let _gpu = self.gpu_lock.lock().await;
        self.tasks.start_task(id_task);
        tracing::debug!(id_task, "Generation started");

        job.await
    }
}

/// Marks the task finished however the request ends.
struct FinishOnDrop<'a> {
    tasks: &'a TaskRegistry,
    id_task: &'a str,
}

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.tasks.finish_task(self.id_task);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::tasks::TaskStatus;

    #[tokio::test]
    async fn task_is_finished_after_failure() {
        let queue = GenerationQueue::new(true, Arc::new(TaskRegistry::new()));
        let result: Result<(), _> = queue
            .run("t1", async { Err(AppError::BadRequest("nope".into())) })
            .await;
        assert_matches!(result, Err(AppError::BadRequest(_)));
        assert_eq!(queue.tasks().status("t1"), TaskStatus::Finished);
        assert_eq!(queue.available_permits(), Some(QUEUE_CONCURRENCY));
    }

    #[tokio::test]
    async fn generations_never_overlap() {
        let queue = Arc::new(GenerationQueue::new(true, Arc::new(TaskRegistry::new())));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..4 {
            let queue = Arc::clone(&queue);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                queue
                    .run(&format!("t{i}"), async {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, AppError>(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closed_queue_rejects() {
        let queue = GenerationQueue::new(true, Arc::new(TaskRegistry::new()));
        queue.close();
        let result = queue.run("t1", async { Ok::<_, AppError>(()) }).await;
        assert_matches!(result, Err(AppError::Unavailable(_)));
    }

    #[tokio::test]
    async fn disabled_queue_still_runs() {
        let queue = GenerationQueue::new(false, Arc::new(TaskRegistry::new()));
        assert!(!queue.is_enabled());
        assert_eq!(queue.available_permits(), None);
        let value = queue.run("t1", async { Ok::<_, AppError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
