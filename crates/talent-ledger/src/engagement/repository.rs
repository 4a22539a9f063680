//! Storage and collaborator ports.
//!
//! Every method that depends on a record's current value is a single conditional write:
//! adapters must evaluate the guard and apply the mutation atomically (a conditional
//! `UPDATE ... WHERE`, a compare-and-swap, or one critical section for in-process maps).

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{
    Application, ApplicationId, ApplicationStatus, ApprovalStatus, PaymentBatch, PaymentBatchId,
    PostingId, Task, TaskId, TrackStatus, UserId,
};

/// Error enumeration for storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Error enumeration for external collaborator calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("posting '{0}' is unknown")]
    UnknownPosting(String),
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a compare-and-set style write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    /// The guard held and the returned record is the post-write state.
    Applied(T),
    /// The guard failed; the returned record is the current state.
    Rejected(T),
    /// No live record with that id exists.
    Missing,
}

/// Approval/remarks mutation applied to a task in one guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDecisionWrite {
    pub approval_status: ApprovalStatus,
    pub remarks: Option<String>,
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Insert unless a live `Applied` application exists for the same candidate/posting pair.
    async fn insert_if_no_active(&self, application: Application) -> Result<(), RepositoryError>;
    async fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    async fn find_active(
        &self,
        candidate_id: &UserId,
        posting_id: &PostingId,
    ) -> Result<Option<Application>, RepositoryError>;
    async fn transition_status(
        &self,
        id: &ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<Guarded<Application>, RepositoryError>;
    async fn compare_and_set_approval(
        &self,
        id: &ApplicationId,
        expected: ApprovalStatus,
        next: ApprovalStatus,
    ) -> Result<Guarded<Application>, RepositoryError>;
    async fn list_for_posting(
        &self,
        posting_id: &PostingId,
    ) -> Result<Vec<Application>, RepositoryError>;
    async fn list_for_candidate(
        &self,
        candidate_id: &UserId,
    ) -> Result<Vec<Application>, RepositoryError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> Result<(), RepositoryError>;
    async fn fetch(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError>;
    async fn list_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Task>, RepositoryError>;
    /// Apply the decision only while the task's approval status still equals `expected`.
    async fn apply_decision(
        &self,
        id: &TaskId,
        expected: ApprovalStatus,
        write: TaskDecisionWrite,
    ) -> Result<Guarded<Task>, RepositoryError>;
    /// Rewrite progress and its derived status while the approval status equals `expected`.
    async fn update_progress(
        &self,
        id: &TaskId,
        expected: ApprovalStatus,
        progress_percent: u8,
        track_status: TrackStatus,
    ) -> Result<Guarded<Task>, RepositoryError>;
    /// Atomically flip `is_paid` to `to_paid` on every live approved task of the application
    /// whose flag currently differs, stamping `batch_id` (or clearing it when unpaying).
    /// Returns exactly the tasks that changed; all of them or none are written.
    async fn claim_for_settlement(
        &self,
        application_id: &ApplicationId,
        to_paid: bool,
        batch_id: Option<PaymentBatchId>,
    ) -> Result<Vec<Task>, RepositoryError>;
}

/// Append-only settlement ledger. There is deliberately no update or delete method.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Append the batch; returns `false` when a batch with the same id already exists.
    async fn append_if_absent(&self, batch: PaymentBatch) -> Result<bool, RepositoryError>;
    async fn fetch(&self, id: &PaymentBatchId) -> Result<Option<PaymentBatch>, RepositoryError>;
    async fn list_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<PaymentBatch>, RepositoryError>;
}

/// Result of the guarded applicant-counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    Applied { count: u32 },
    /// The posting stopped accepting applications between the read and the write.
    Closed,
}

#[async_trait]
pub trait JobPostCollaborator: Send + Sync {
    async fn is_open_for_applications(
        &self,
        posting_id: &PostingId,
    ) -> Result<bool, CollaboratorError>;
    /// Increment guarded by the same "open for applications" predicate.
    async fn increment_applicant_count(
        &self,
        posting_id: &PostingId,
    ) -> Result<CounterUpdate, CollaboratorError>;
    /// Decrement with a floor of zero; returns the resulting count.
    async fn decrement_applicant_count(
        &self,
        posting_id: &PostingId,
    ) -> Result<u32, CollaboratorError>;
    async fn hourly_rate(&self, posting_id: &PostingId) -> Result<Decimal, CollaboratorError>;
    async fn owner(&self, posting_id: &PostingId) -> Result<UserId, CollaboratorError>;
}

/// Profile sections a candidate must complete before applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prerequisite {
    Education,
    Experience,
    Skills,
    Resume,
}

impl Prerequisite {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Education,
            Self::Experience,
            Self::Skills,
            Self::Resume,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Education => "education",
            Self::Experience => "experience",
            Self::Skills => "skills",
            Self::Resume => "resume",
        }
    }
}

#[async_trait]
pub trait CandidateProfileCollaborator: Send + Sync {
    async fn missing_prerequisites(
        &self,
        candidate_id: &UserId,
    ) -> Result<Vec<Prerequisite>, CollaboratorError>;

    async fn has_completed_prerequisites(
        &self,
        candidate_id: &UserId,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.missing_prerequisites(candidate_id).await?.is_empty())
    }
}

/// Event category carried on outbound notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ApplicationReceived,
    ApplicationDecided,
    TaskDecided,
    PaymentSettled,
}

/// One-way message for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub target: UserId,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Fire-and-forget consumer. Implementations must hand off without blocking.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, notification: Notification) -> Result<(), NotificationError>;
}

pub type SharedApplicationStore = Arc<dyn ApplicationStore>;
pub type SharedTaskStore = Arc<dyn TaskStore>;
pub type SharedPaymentLedger = Arc<dyn PaymentLedger>;
pub type SharedJobPosts = Arc<dyn JobPostCollaborator>;
pub type SharedProfiles = Arc<dyn CandidateProfileCollaborator>;
pub type SharedNotifications = Arc<dyn NotificationSink>;
