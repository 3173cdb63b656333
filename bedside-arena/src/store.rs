//! In-memory assessment task store.
//!
//! Tasks are indexed by id behind an `RwLock`; each task's state sits behind
//! its own `Mutex` so sessions of different tasks never contend, and appends
//! from concurrent sessions of one task are serialized.

use std::collections::HashMap;
use std::sync::Arc;

use bedside_core::types::TaskId;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::TaskError;
use crate::task::{AssessmentTask, SessionResult, TaskStatus, TaskSummary};

struct TaskEntry {
    task: Mutex<AssessmentTask>,
    cancel: CancellationToken,
}

/// Tracks every assessment task and its session results.
#[derive(Default)]
pub struct AssessmentTaskStore {
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
}

impl AssessmentTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a task in the `created` state.
    pub async fn create(
        &self,
        doctor_endpoint: impl Into<String>,
        personas: Vec<String>,
        max_rounds: u32,
    ) -> TaskId {
        let task = AssessmentTask::new(doctor_endpoint, personas, max_rounds);
        let id = task.id;
        let entry = Arc::new(TaskEntry {
            task: Mutex::new(task),
            cancel: CancellationToken::new(),
        });
        self.tasks.write().await.insert(id, entry);
        debug!(task_id = %id, "task created");
        id
    }

    async fn entry(&self, id: TaskId) -> Result<Arc<TaskEntry>, TaskError> {
        self.tasks
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TaskError::NotFound(id))
    }

    /// Snapshot of a task.
    pub async fn get_status(&self, id: TaskId) -> Result<AssessmentTask, TaskError> {
        let entry = self.entry(id).await?;
        let task = entry.task.lock().await;
        Ok(task.clone())
    }

    pub async fn status(&self, id: TaskId) -> Result<TaskStatus, TaskError> {
        let entry = self.entry(id).await?;
        let status = entry.task.lock().await.status;
        Ok(status)
    }

    /// All tasks, oldest first.
    pub async fn list_tasks(&self) -> Vec<AssessmentTask> {
        let entries: Vec<Arc<TaskEntry>> = self.tasks.read().await.values().cloned().collect();
        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            tasks.push(entry.task.lock().await.clone());
        }
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    pub async fn mark_working(&self, id: TaskId) -> Result<(), TaskError> {
        let entry = self.entry(id).await?;
        let mut task = entry.task.lock().await;
        transition(&mut task, TaskStatus::Working)
    }

    /// Record one session's result. Accepted while working, and after a
    /// cancel so sessions that were in flight still land.
    pub async fn append_session_result(&self, id: TaskId, result: SessionResult) -> Result<(), TaskError> {
        let entry = self.entry(id).await?;
        let mut task = entry.task.lock().await;
        if !matches!(task.status, TaskStatus::Working | TaskStatus::Canceled) {
            return Err(TaskError::NotAccepting {
                task_id: id,
                status: task.status,
            });
        }
        debug!(
            task_id = %id,
            persona_id = %result.persona_id(),
            outcome = result.outcome().map(|o| o.as_str()),
            "session result recorded"
        );
        task.results.push(result);
        task.updated_at = Utc::now();
        Ok(())
    }

    /// Move a task to a terminal status and compute its summary.
    pub async fn mark_terminal(&self, id: TaskId, status: TaskStatus) -> Result<(), TaskError> {
        let entry = self.entry(id).await?;
        let mut task = entry.task.lock().await;
        if !status.is_terminal() {
            return Err(TaskError::InvalidTransition {
                task_id: id,
                from: task.status,
                to: status,
            });
        }
        transition(&mut task, status)?;
        seal_summary(&mut task);
        Ok(())
    }

    /// Close a run: completed when any session produced a report, failed
    /// when none did. A canceled task stays canceled; its summary is still
    /// computed over whatever landed.
    pub async fn finish(&self, id: TaskId) -> Result<TaskStatus, TaskError> {
        let entry = self.entry(id).await?;
        let mut task = entry.task.lock().await;
        if task.status != TaskStatus::Canceled {
            let status = if task.has_report() {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
            transition(&mut task, status)?;
        }
        seal_summary(&mut task);
        info!(
            task_id = %id,
            status = task.status.as_str(),
            sessions = task.results.len(),
            "task finished"
        );
        Ok(task.status)
    }

    /// Cancel a task and signal its sessions. Canceling twice is a no-op.
    pub async fn cancel(&self, id: TaskId) -> Result<TaskStatus, TaskError> {
        let entry = self.entry(id).await?;
        let mut task = entry.task.lock().await;
        if task.status != TaskStatus::Canceled {
            transition(&mut task, TaskStatus::Canceled)?;
            info!(task_id = %id, "task canceled");
        }
        entry.cancel.cancel();
        Ok(task.status)
    }

    /// Token the task's sessions poll between rounds.
    pub async fn cancellation_token(&self, id: TaskId) -> Result<CancellationToken, TaskError> {
        Ok(self.entry(id).await?.cancel.clone())
    }
}

fn transition(task: &mut AssessmentTask, next: TaskStatus) -> Result<(), TaskError> {
    if !task.status.can_transition_to(next) {
        return Err(TaskError::InvalidTransition {
            task_id: task.id,
            from: task.status,
            to: next,
        });
    }
    task.status = next;
    task.updated_at = Utc::now();
    Ok(())
}

fn seal_summary(task: &mut AssessmentTask) {
    task.summary = Some(TaskSummary::from_results(&task.results));
    task.finished_at.get_or_insert(task.updated_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedside_core::session::{DialogueSession, SessionOutcome, SessionPhase};

    fn personas() -> Vec<String> {
        vec!["INTJ_LUNG".to_string(), "ENFP_PNEUMO".to_string()]
    }

    fn result(outcome: SessionOutcome) -> SessionResult {
        let mut session = DialogueSession::new("INTJ_LUNG", "http://doctor");
        session.transition(SessionPhase::Reporting).unwrap();
        session.seal(outcome).unwrap();
        SessionResult {
            session,
            report: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn create_and_read() {
        let store = AssessmentTaskStore::new();
        let id = store.create("http://doctor", personas(), 5).await;
        let task = store.get_status(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.personas.len(), 2);
        assert_eq!(task.max_rounds, 5);
        // Reads are idempotent.
        assert_eq!(store.get_status(id).await.unwrap(), task);
    }

    #[tokio::test]
    async fn unknown_task() {
        let store = AssessmentTaskStore::new();
        let id = TaskId::new();
        assert_eq!(store.status(id).await, Err(TaskError::NotFound(id)));
    }

    #[tokio::test]
    async fn appends_require_working() {
        let store = AssessmentTaskStore::new();
        let id = store.create("http://doctor", personas(), 5).await;
        let err = store
            .append_session_result(id, result(SessionOutcome::PatientLeft))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::NotAccepting { status: TaskStatus::Created, .. }));

        store.mark_working(id).await.unwrap();
        store
            .append_session_result(id, result(SessionOutcome::PatientLeft))
            .await
            .unwrap();
        assert_eq!(store.get_status(id).await.unwrap().results.len(), 1);
    }

    #[tokio::test]
    async fn finish_without_reports_fails() {
        let store = AssessmentTaskStore::new();
        let id = store.create("http://doctor", personas(), 5).await;
        store.mark_working(id).await.unwrap();
        store
            .append_session_result(id, result(SessionOutcome::ParticipantUnavailable))
            .await
            .unwrap();
        assert_eq!(store.finish(id).await.unwrap(), TaskStatus::Failed);

        let task = store.get_status(id).await.unwrap();
        assert!(task.finished_at.is_some());
        assert_eq!(task.summary.unwrap().outcomes["participant_unavailable"], 1);
    }

    #[tokio::test]
    async fn terminal_states_are_final() {
        let store = AssessmentTaskStore::new();
        let id = store.create("http://doctor", personas(), 5).await;
        store.mark_working(id).await.unwrap();
        store.mark_terminal(id, TaskStatus::Completed).await.unwrap();

        assert!(store.mark_working(id).await.is_err());
        assert!(store.mark_terminal(id, TaskStatus::Failed).await.is_err());
        assert!(store.cancel(id).await.is_err());
        assert!(store
            .append_session_result(id, result(SessionOutcome::PatientLeft))
            .await
            .is_err());
        assert_eq!(store.status(id).await.unwrap(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn mark_terminal_rejects_non_terminal_status() {
        let store = AssessmentTaskStore::new();
        let id = store.create("http://doctor", personas(), 5).await;
        assert!(store.mark_terminal(id, TaskStatus::Working).await.is_err());
    }

    #[tokio::test]
    async fn cancel_signals_token_and_keeps_accepting_results() {
        let store = AssessmentTaskStore::new();
        let id = store.create("http://doctor", personas(), 5).await;
        store.mark_working(id).await.unwrap();
        let token = store.cancellation_token(id).await.unwrap();

        assert_eq!(store.cancel(id).await.unwrap(), TaskStatus::Canceled);
        assert!(token.is_cancelled());
        assert_eq!(store.cancel(id).await.unwrap(), TaskStatus::Canceled);

        store
            .append_session_result(id, result(SessionOutcome::Canceled))
            .await
            .unwrap();
        assert_eq!(store.finish(id).await.unwrap(), TaskStatus::Canceled);
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let store = Arc::new(AssessmentTaskStore::new());
        let id = store.create("http://doctor", personas(), 5).await;
        store.mark_working(id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_session_result(id, result(SessionOutcome::PatientAccepted))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.get_status(id).await.unwrap().results.len(), 32);
    }

    #[tokio::test]
    async fn lists_tasks_oldest_first() {
        let store = AssessmentTaskStore::new();
        let first = store.create("http://a", personas(), 5).await;
        let second = store.create("http://b", personas(), 5).await;
        let ids: Vec<TaskId> = store.list_tasks().await.iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first) && ids.contains(&second));
    }
}
