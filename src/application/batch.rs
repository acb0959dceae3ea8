use crate::error::{Result, SmokeError};
use std::collections::HashMap;
use std::future::Future;
use tokio::task::{Id, JoinSet};

/// A set of named tasks that is always joined in full.
///
/// Every spawned task yields exactly one `(name, result)` entry from [`Batch::join`], in
/// completion order. A panicking task is reported as [`SmokeError::Task`] under its own
/// name instead of disappearing.
pub struct Batch<T> {
    tasks: JoinSet<Result<T>>,
    names: HashMap<Id, String>,
}

impl<T: Send + 'static> Default for Batch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Batch<T> {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            names: HashMap::new(),
        }
    }

    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = self.tasks.spawn(task);
        self.names.insert(handle.id(), name.into());
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub async fn join(mut self) -> Vec<(String, Result<T>)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(SmokeError::Task(e.to_string()))),
            };
            let name = self.names.remove(&id).unwrap_or_default();
            outcomes.push((name, result));
        }
        outcomes
    }
}
