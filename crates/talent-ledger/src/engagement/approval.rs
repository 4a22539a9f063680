use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::domain::{Actor, ApprovalStatus, Change, Decision, Task, TaskId};
use super::error::EngineError;
use super::lifecycle::ApplicationLifecycle;
use super::notify::dispatch;
use super::repository::{Guarded, NotificationKind, SharedTaskStore, TaskDecisionWrite};

/// Employer input for a task decision; either field may be omitted, not both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDecision {
    #[serde(default)]
    pub approval_status: Option<Decision>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl TaskDecision {
    pub fn approve() -> Self {
        Self {
            approval_status: Some(Decision::Approved),
            remarks: None,
        }
    }

    pub fn reject() -> Self {
        Self {
            approval_status: Some(Decision::Rejected),
            remarks: None,
        }
    }

    pub fn remarks(remarks: impl Into<String>) -> Self {
        Self {
            approval_status: None,
            remarks: Some(remarks.into()),
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }
}

/// Employer/admin approval of individual tasks and the remarks policy.
pub struct ApprovalGate {
    tasks: SharedTaskStore,
    lifecycle: Arc<ApplicationLifecycle>,
    remarks_limit: usize,
}

impl ApprovalGate {
    pub fn new(
        tasks: SharedTaskStore,
        lifecycle: Arc<ApplicationLifecycle>,
        remarks_limit: usize,
    ) -> Self {
        Self {
            tasks,
            lifecycle,
            remarks_limit,
        }
    }

    #[instrument(skip_all, fields(actor = %actor.id, task = %task_id))]
    pub async fn decide(
        &self,
        actor: &Actor,
        task_id: &TaskId,
        decision: TaskDecision,
    ) -> Result<Change<Task>, EngineError> {
        let task = self
            .tasks
            .fetch(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", task_id))?;

        // Re-read the parent so a revoked application locks decisions immediately.
        let application = self.lifecycle.load(&task.application_id).await?;
        self.lifecycle.authorize_manager(actor, &application).await?;
        if !application.is_approved() {
            return Err(EngineError::conflict(format!(
                "application approval is {}; task decisions require an approved application",
                application.approval_status.label()
            )));
        }

        let remarks = self.validate_remarks(decision.remarks)?;
        let status_change = decision
            .approval_status
            .map(ApprovalStatus::from)
            .filter(|next| *next != task.approval_status);

        if status_change.is_none() && remarks.is_none() {
            return Err(EngineError::validation(format!(
                "nothing to update: task is already {} and no remarks were supplied",
                task.approval_status.label()
            )));
        }

        if status_change.is_some() && task.approval_status != ApprovalStatus::Pending {
            return Err(EngineError::conflict(format!(
                "task is already {}; only pending tasks can be approved or rejected",
                task.approval_status.label()
            )));
        }

        let resulting = status_change.unwrap_or(task.approval_status);
        if remarks.is_some() && resulting != ApprovalStatus::Approved {
            return Err(EngineError::conflict(format!(
                "remarks may only be attached to approved tasks (task is {})",
                resulting.label()
            )));
        }

        let write = TaskDecisionWrite {
            approval_status: resulting,
            remarks,
        };
        let updated = match self
            .tasks
            .apply_decision(task_id, task.approval_status, write)
            .await?
        {
            Guarded::Applied(updated) => updated,
            Guarded::Rejected(current) => {
                return Err(EngineError::conflict(format!(
                    "task was {} concurrently; reload and retry",
                    current.approval_status.label()
                )));
            }
            Guarded::Missing => return Err(EngineError::not_found("task", task_id)),
        };

        if let Some(next) = status_change {
            info!(to = next.label(), "task decided");
            dispatch(
                self.lifecycle.notifications().as_ref(),
                &application.candidate_id,
                NotificationKind::TaskDecided,
                "Task update",
                format!("Your task \"{}\" was {}", updated.title, next.label()),
            );
        } else {
            info!("task remarks updated");
        }

        Ok(Change::changed(updated))
    }

    fn validate_remarks(&self, remarks: Option<String>) -> Result<Option<String>, EngineError> {
        let Some(remarks) = remarks else {
            return Ok(None);
        };
        let trimmed = remarks.trim();
        if trimmed.is_empty() {
            return Err(EngineError::validation("remarks must not be blank"));
        }
        if trimmed.chars().count() > self.remarks_limit {
            return Err(EngineError::validation(format!(
                "remarks must not exceed {} characters",
                self.remarks_limit
            )));
        }
        Ok(Some(trimmed.to_string()))
    }
}
