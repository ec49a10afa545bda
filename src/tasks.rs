use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Started,
    Running,
    Completed,
    Failed,
}

/// Lifecycle of one background collection task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub status: TaskState,
    pub channel_id: String,
    pub window: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_saved: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of the most recent completed collection, shown on the status
/// endpoint. Sync collections record it too, without a task entry.
#[derive(Debug, Clone, Serialize)]
pub struct LastCollection {
    pub channel_id: String,
    pub window: String,
    pub timestamp: DateTime<Utc>,
    pub execution_time: String,
    pub status: String,
}

/// Tracks background collection tasks. The registry is created by the
/// caller that owns the server state and cloned into spawned tasks; there
/// is no ambient global.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<String, TaskStatus>>>,
    last_collection: Arc<Mutex<Option<LastCollection>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new task. Returns its id, `task_YYYYmmdd_HHMMSS`.
    pub fn start(&self, channel_id: &str, window: &str) -> String {
        let task_id = format!("task_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        let status = TaskStatus {
            status: TaskState::Started,
            channel_id: channel_id.to_string(),
            window: window.to_string(),
            start_time: Utc::now(),
            end_time: None,
            execution_time: None,
            messages_saved: None,
            error: None,
        };
        self.tasks.lock().unwrap().insert(task_id.clone(), status);
        task_id
    }

    pub fn mark_running(&self, task_id: &str) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(task_id) {
            task.status = TaskState::Running;
        }
    }

    pub fn complete(&self, task_id: &str, messages_saved: usize, execution_time: &str) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.get_mut(task_id) {
            task.status = TaskState::Completed;
            task.end_time = Some(Utc::now());
            task.execution_time = Some(execution_time.to_string());
            task.messages_saved = Some(messages_saved);

            self.record_completion(LastCollection {
                channel_id: task.channel_id.clone(),
                window: task.window.clone(),
                timestamp: task.start_time,
                execution_time: execution_time.to_string(),
                status: "completed".to_string(),
            });
        }
    }

    pub fn fail(&self, task_id: &str, error: &str) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(task_id) {
            task.status = TaskState::Failed;
            task.end_time = Some(Utc::now());
            task.error = Some(error.to_string());
        }
    }

    pub fn get(&self, task_id: &str) -> Option<TaskStatus> {
        self.tasks.lock().unwrap().get(task_id).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, TaskStatus> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn record_completion(&self, info: LastCollection) {
        *self.last_collection.lock().unwrap() = Some(info);
    }

    pub fn last_collection(&self) -> Option<LastCollection> {
        self.last_collection.lock().unwrap().clone()
    }
}
