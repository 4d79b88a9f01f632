//! Task store for asynchronous admin operations
//!
//! Finished tasks expire after the TTL. When the store is full the oldest
//! finished tasks are evicted first; running tasks are never evicted, and a
//! store full of running tasks refuses new ones.

use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of a background task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Still running
    Running,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

/// A background task as reported by `GET /v1/tasks/{id}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: Uuid,
    pub kind: String,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bounded store of background tasks
#[derive(Debug)]
pub struct TaskStore {
    tasks: Mutex<HashMap<Uuid, TaskRecord>>,
    ttl: chrono::Duration,
    capacity: usize,
}

impl TaskStore {
    /// Store keeping finished tasks for `ttl`, at most `capacity` at once
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TaskRecord>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expire(&self, tasks: &mut HashMap<Uuid, TaskRecord>, now: DateTime<Utc>) {
        let ttl = self.ttl;
        tasks.retain(|_, task| match task.finished_at {
            Some(finished) => now.signed_duration_since(finished) < ttl,
            None => true,
        });
    }

    /// Register a running task
    pub fn start(&self, kind: &str) -> Result<Uuid, ControllerError> {
        self.start_at(kind, Utc::now())
    }

    fn start_at(&self, kind: &str, now: DateTime<Utc>) -> Result<Uuid, ControllerError> {
        let mut tasks = self.lock();
        self.expire(&mut tasks, now);

        while tasks.len() >= self.capacity {
            let oldest = tasks
                .values()
                .filter_map(|task| task.finished_at.map(|finished| (finished, task.id)))
                .min()
                .map(|(_, id)| id);
            match oldest {
                Some(id) => {
                    debug!("Evicting task {}", id);
                    tasks.remove(&id);
                }
                None => {
                    return Err(ControllerError::Busy(format!(
                        "{} tasks already running",
                        tasks.len()
                    )))
                }
            }
        }

        let id = Uuid::new_v4();
        tasks.insert(
            id,
            TaskRecord {
                id,
                kind: kind.to_string(),
                state: TaskState::Running,
                created_at: now,
                finished_at: None,
                result: None,
                error: None,
            },
        );
        Ok(id)
    }

    /// Record a successful result
    pub fn complete(&self, id: Uuid, result: Value) {
        self.finish(id, TaskState::Completed, Some(result), None, Utc::now());
    }

    /// Record a failure
    pub fn fail(&self, id: Uuid, error: String) {
        self.finish(id, TaskState::Failed, None, Some(error), Utc::now());
    }

    fn finish(&self, id: Uuid, state: TaskState, result: Option<Value>, error: Option<String>, now: DateTime<Utc>) {
        if let Some(task) = self.lock().get_mut(&id) {
            task.state = state;
            task.finished_at = Some(now);
            task.result = result;
            task.error = error;
        }
    }

    /// Look up a task that has not expired
    pub fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: Uuid, now: DateTime<Utc>) -> Option<TaskRecord> {
        let mut tasks = self.lock();
        self.expire(&mut tasks, now);
        tasks.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
