//! Registry for cosmetic background tasks (telemetry watchers, landing
//! observer, status text). One shutdown call cancels and awaits all of them,
//! so nothing outlives the flight it was spawned for.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct Registered {
    name: &'static str,
    handle: JoinHandle<()>,
}

pub struct TaskRegistry {
    token: CancellationToken,
    tasks: Vec<Registered>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self { token: CancellationToken::new(), tasks: Vec::new() }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a named task that ends either on its own or at shutdown.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!(task = name, "task cancelled"),
                _ = future => debug!(task = name, "task finished"),
            }
        });
        self.tasks.push(Registered { name, handle });
    }

    /// Cancel every registered task and wait for all of them to stop.
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(err) = task.handle.await {
                if err.is_panic() {
                    warn!(task = task.name, "background task panicked");
                }
            }
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn shutdown_stops_infinite_tasks() {
        let mut registry = TaskRegistry::new();
        registry.spawn("spin", async {
            loop {
                tokio::task::yield_now().await;
            }
        });
        registry.spawn("spin2", async {
            loop {
                tokio::task::yield_now().await;
            }
        });
        assert_eq!(registry.len(), 2);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn finished_tasks_do_not_block_shutdown() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let mut registry = TaskRegistry::new();
        registry.spawn("once", async move {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;
        registry.shutdown().await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
