use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinSet;

/// Detached tasks that must be allowed to finish before shutdown.
#[derive(Debug, Default)]
pub struct TaskTracker {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskTracker {
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Tasks spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every task spawned so far.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                tracing::error!(error = %err, "background task failed");
            }
        }
    }
}
