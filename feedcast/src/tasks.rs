use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::error;

/// Handles of spawned tasks. Dropping the group detaches them; they keep
/// running to completion either way.
#[derive(Debug)]
pub struct TaskGroup<T> {
    handles: Vec<JoinHandle<T>>,
}

impl<T> Default for TaskGroup<T> {
    fn default() -> Self {
        Self { handles: Vec::new() }
    }
}

impl<T: Send + 'static> TaskGroup<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: JoinHandle<T>) {
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every task. Panicked or aborted tasks are logged and left
    /// out of the result.
    pub async fn join_all(self) -> Vec<T> {
        join_all(self.handles)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(value) => Some(value),
                Err(e) => {
                    error!("Background task did not complete: {}", e);
                    None
                }
            })
            .collect()
    }
}
