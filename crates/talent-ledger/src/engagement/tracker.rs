use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, ApprovalStatus, Task, TaskId,
};
use super::error::EngineError;
use super::lifecycle::ApplicationLifecycle;
use super::metrics::{self, TimeReport};
use super::repository::{Guarded, SharedTaskStore};

const MAX_TITLE_CHARS: usize = 200;

/// Candidate-supplied payload for a new task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attachment_ref: Option<String>,
    #[serde(flatten)]
    pub time: TimeReport,
    #[serde(default)]
    pub progress_percent: Option<u8>,
}

/// Task submission and progress tracking against approved applications.
pub struct TaskTracker {
    tasks: SharedTaskStore,
    lifecycle: Arc<ApplicationLifecycle>,
}

impl TaskTracker {
    pub fn new(tasks: SharedTaskStore, lifecycle: Arc<ApplicationLifecycle>) -> Self {
        Self { tasks, lifecycle }
    }

    #[instrument(skip_all, fields(actor = %actor.id, application = %application_id))]
    pub async fn submit(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        submission: TaskSubmission,
    ) -> Result<Task, EngineError> {
        let application = self.lifecycle.load(application_id).await?;
        if !actor.is_candidate(&application.candidate_id) {
            return Err(EngineError::unauthorized(
                "only the candidate who owns the application may submit tasks",
            ));
        }
        accepting_work(&application)?;

        let title = submission.title.trim();
        if title.is_empty() {
            return Err(EngineError::validation("task title must not be empty"));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(EngineError::validation(format!(
                "task title must not exceed {MAX_TITLE_CHARS} characters"
            )));
        }

        let reported_hours = metrics::reported_hours(&submission.time)?;
        let progress_percent = metrics::progress_percent(submission.progress_percent)?;
        let now = Utc::now();

        let task = Task {
            id: TaskId::generate(),
            application_id: application.id.clone(),
            title: title.to_string(),
            description: submission.description,
            attachment_ref: submission.attachment_ref.filter(|value| !value.trim().is_empty()),
            start_time: submission.time.start_time,
            end_time: submission.time.end_time,
            reported_hours,
            progress_percent,
            track_status: metrics::track_status(progress_percent),
            approval_status: ApprovalStatus::Pending,
            remarks: None,
            is_paid: false,
            payment_batch_id: None,
            created_at: now,
            updated_at: now,
            removed_at: None,
        };

        self.tasks.insert(task.clone()).await?;
        info!(task = %task.id, hours = %task.reported_hours, "task submitted");
        Ok(task)
    }

    /// Update reported progress; the derived track status is recomputed in the same write.
    #[instrument(skip_all, fields(actor = %actor.id, task = %task_id))]
    pub async fn update_progress(
        &self,
        actor: &Actor,
        task_id: &TaskId,
        progress_percent: u8,
    ) -> Result<Task, EngineError> {
        let task = self.load(task_id).await?;
        let application = self.lifecycle.load(&task.application_id).await?;
        if !actor.is_candidate(&application.candidate_id) {
            return Err(EngineError::unauthorized(
                "only the candidate who owns the task may update its progress",
            ));
        }
        accepting_work(&application)?;
        if task.approval_status == ApprovalStatus::Rejected {
            return Err(EngineError::conflict("rejected tasks cannot be updated"));
        }

        let progress_percent = metrics::progress_percent(Some(progress_percent))?;
        match self
            .tasks
            .update_progress(
                task_id,
                task.approval_status,
                progress_percent,
                metrics::track_status(progress_percent),
            )
            .await?
        {
            Guarded::Applied(updated) => {
                info!(
                    progress = progress_percent,
                    status = ?updated.track_status,
                    "task progress updated"
                );
                Ok(updated)
            }
            Guarded::Rejected(current) => Err(EngineError::conflict(format!(
                "task was {} concurrently; reload and retry",
                current.approval_status.label()
            ))),
            Guarded::Missing => Err(EngineError::not_found("task", task_id)),
        }
    }

    pub async fn list(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Vec<Task>, EngineError> {
        let application = self.lifecycle.load(application_id).await?;
        self.lifecycle.authorize_viewer(actor, &application).await?;
        Ok(self.tasks.list_for_application(application_id).await?)
    }

    pub async fn get(&self, actor: &Actor, task_id: &TaskId) -> Result<Task, EngineError> {
        let task = self.load(task_id).await?;
        let application = self.lifecycle.load(&task.application_id).await?;
        self.lifecycle.authorize_viewer(actor, &application).await?;
        Ok(task)
    }

    async fn load(&self, task_id: &TaskId) -> Result<Task, EngineError> {
        self.tasks
            .fetch(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", task_id))
    }
}

/// Work is tracked only while the candidacy is approved and not withdrawn.
fn accepting_work(application: &Application) -> Result<(), EngineError> {
    if application.application_status == ApplicationStatus::Withdrawn {
        return Err(EngineError::conflict(
            "application has been withdrawn; tasks can no longer be tracked",
        ));
    }
    if !application.is_approved() {
        return Err(EngineError::conflict(format!(
            "application approval is {}; tasks require an approved application",
            application.approval_status.label()
        )));
    }
    Ok(())
}
