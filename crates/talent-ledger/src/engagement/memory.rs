//! In-process adapters for every port.
//!
//! Each conditional operation runs inside a single write-lock critical section, which is the
//! in-memory equivalent of a storage-level conditional update.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::domain::{
    Application, ApplicationId, ApplicationStatus, ApprovalStatus, PaymentBatch, PaymentBatchId,
    PostingId, SoftDelete, Task, TaskId, TrackStatus, UserId,
};
use super::engine::EnginePorts;
use super::repository::{
    ApplicationStore, CandidateProfileCollaborator, CollaboratorError, CounterUpdate, Guarded,
    JobPostCollaborator, Notification, NotificationError, NotificationSink, PaymentLedger,
    Prerequisite, RepositoryError, SharedNotifications, TaskDecisionWrite, TaskStore,
};

fn live<'a, T: SoftDelete + 'a>(
    records: impl IntoIterator<Item = &'a T>,
) -> impl Iterator<Item = &'a T> {
    records.into_iter().filter(|record| record.is_live())
}

fn sorted_by_creation<T>(mut records: Vec<T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    records.sort_by_key(|record| created_at(record));
    records
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationStore {
    records: Arc<RwLock<HashMap<ApplicationId, Application>>>,
}

impl InMemoryApplicationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for InMemoryApplicationStore {
    async fn insert_if_no_active(&self, application: Application) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        let duplicate = live(records.values()).any(|existing| {
            existing.candidate_id == application.candidate_id
                && existing.posting_id == application.posting_id
                && existing.application_status == ApplicationStatus::Applied
        });
        if duplicate || records.contains_key(&application.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(application.id.clone(), application);
        Ok(())
    }

    async fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(id).filter(|record| record.is_live()).cloned())
    }

    async fn find_active(
        &self,
        candidate_id: &UserId,
        posting_id: &PostingId,
    ) -> Result<Option<Application>, RepositoryError> {
        let records = self.records.read().await;
        let found = live(records.values())
            .find(|record| {
                &record.candidate_id == candidate_id
                    && &record.posting_id == posting_id
                    && record.application_status == ApplicationStatus::Applied
            })
            .cloned();
        Ok(found)
    }

    async fn transition_status(
        &self,
        id: &ApplicationId,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<Guarded<Application>, RepositoryError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(id).filter(|record| record.is_live()) else {
            return Ok(Guarded::Missing);
        };
        if record.application_status != from {
            return Ok(Guarded::Rejected(record.clone()));
        }
        record.application_status = to;
        record.updated_at = Utc::now();
        Ok(Guarded::Applied(record.clone()))
    }

    async fn compare_and_set_approval(
        &self,
        id: &ApplicationId,
        expected: ApprovalStatus,
        next: ApprovalStatus,
    ) -> Result<Guarded<Application>, RepositoryError> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(id).filter(|record| record.is_live()) else {
            return Ok(Guarded::Missing);
        };
        if record.approval_status != expected {
            return Ok(Guarded::Rejected(record.clone()));
        }
        record.approval_status = next;
        record.updated_at = Utc::now();
        Ok(Guarded::Applied(record.clone()))
    }

    async fn list_for_posting(
        &self,
        posting_id: &PostingId,
    ) -> Result<Vec<Application>, RepositoryError> {
        let records = self.records.read().await;
        let matching = live(records.values())
            .filter(|record| &record.posting_id == posting_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(matching, |record| record.created_at))
    }

    async fn list_for_candidate(
        &self,
        candidate_id: &UserId,
    ) -> Result<Vec<Application>, RepositoryError> {
        let records = self.records.read().await;
        let matching = live(records.values())
            .filter(|record| &record.candidate_id == candidate_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(matching, |record| record.created_at))
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTaskStore {
    records: Arc<RwLock<HashMap<TaskId, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&task.id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(task.id.clone(), task);
        Ok(())
    }

    async fn fetch(&self, id: &TaskId) -> Result<Option<Task>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(id).filter(|record| record.is_live()).cloned())
    }

    async fn list_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<Task>, RepositoryError> {
        let records = self.records.read().await;
        let matching = live(records.values())
            .filter(|task| &task.application_id == application_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(matching, |task| task.created_at))
    }

    async fn apply_decision(
        &self,
        id: &TaskId,
        expected: ApprovalStatus,
        write: TaskDecisionWrite,
    ) -> Result<Guarded<Task>, RepositoryError> {
        let mut records = self.records.write().await;
        let Some(task) = records.get_mut(id).filter(|task| task.is_live()) else {
            return Ok(Guarded::Missing);
        };
        if task.approval_status != expected {
            return Ok(Guarded::Rejected(task.clone()));
        }
        task.approval_status = write.approval_status;
        if let Some(remarks) = write.remarks {
            task.remarks = Some(remarks);
        }
        task.updated_at = Utc::now();
        Ok(Guarded::Applied(task.clone()))
    }

    async fn update_progress(
        &self,
        id: &TaskId,
        expected: ApprovalStatus,
        progress_percent: u8,
        track_status: TrackStatus,
    ) -> Result<Guarded<Task>, RepositoryError> {
        let mut records = self.records.write().await;
        let Some(task) = records.get_mut(id).filter(|task| task.is_live()) else {
            return Ok(Guarded::Missing);
        };
        if task.approval_status != expected {
            return Ok(Guarded::Rejected(task.clone()));
        }
        task.progress_percent = progress_percent;
        task.track_status = track_status;
        task.updated_at = Utc::now();
        Ok(Guarded::Applied(task.clone()))
    }

    async fn claim_for_settlement(
        &self,
        application_id: &ApplicationId,
        to_paid: bool,
        batch_id: Option<PaymentBatchId>,
    ) -> Result<Vec<Task>, RepositoryError> {
        let mut records = self.records.write().await;
        let now = Utc::now();
        let mut claimed: Vec<Task> = records
            .values_mut()
            .filter(|task| &task.application_id == application_id && task.is_settleable_to(to_paid))
            .map(|task| {
                task.is_paid = to_paid;
                task.payment_batch_id = if to_paid { batch_id.clone() } else { None };
                task.updated_at = now;
                task.clone()
            })
            .collect();
        claimed.sort_by_key(|task| task.created_at);
        Ok(claimed)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentLedger {
    batches: Arc<RwLock<HashMap<PaymentBatchId, PaymentBatch>>>,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn append_if_absent(&self, batch: PaymentBatch) -> Result<bool, RepositoryError> {
        let mut batches = self.batches.write().await;
        if batches.contains_key(&batch.id) {
            return Ok(false);
        }
        batches.insert(batch.id.clone(), batch);
        Ok(true)
    }

    async fn fetch(&self, id: &PaymentBatchId) -> Result<Option<PaymentBatch>, RepositoryError> {
        let batches = self.batches.read().await;
        Ok(batches.get(id).filter(|batch| batch.is_live()).cloned())
    }

    async fn list_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<PaymentBatch>, RepositoryError> {
        let batches = self.batches.read().await;
        let matching = live(batches.values())
            .filter(|batch| &batch.application_id == application_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(matching, |batch| batch.created_at))
    }
}

/// Whether a posting currently accepts applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostingState {
    Open,
    Closed,
}

#[derive(Debug, Clone)]
struct PostingRecord {
    owner: UserId,
    hourly_rate: Decimal,
    state: PostingState,
    applicant_count: u32,
    removed_at: Option<DateTime<Utc>>,
}

impl PostingRecord {
    fn accepts_applications(&self) -> bool {
        self.state == PostingState::Open && self.removed_at.is_none()
    }
}

/// Job posting collaborator backed by a map; owns the applicant counter.
#[derive(Default, Clone)]
pub struct InMemoryJobBoard {
    postings: Arc<RwLock<HashMap<PostingId, PostingRecord>>>,
}

impl InMemoryJobBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn publish(&self, posting_id: PostingId, owner: UserId, hourly_rate: Decimal) {
        let mut postings = self.postings.write().await;
        postings.insert(
            posting_id,
            PostingRecord {
                owner,
                hourly_rate,
                state: PostingState::Open,
                applicant_count: 0,
                removed_at: None,
            },
        );
    }

    pub async fn set_state(
        &self,
        posting_id: &PostingId,
        state: PostingState,
    ) -> Result<(), CollaboratorError> {
        let mut postings = self.postings.write().await;
        let posting = postings
            .get_mut(posting_id)
            .ok_or_else(|| CollaboratorError::UnknownPosting(posting_id.to_string()))?;
        posting.state = state;
        Ok(())
    }

    pub async fn soft_remove(&self, posting_id: &PostingId) -> Result<(), CollaboratorError> {
        let mut postings = self.postings.write().await;
        let posting = postings
            .get_mut(posting_id)
            .ok_or_else(|| CollaboratorError::UnknownPosting(posting_id.to_string()))?;
        posting.removed_at.get_or_insert_with(Utc::now);
        Ok(())
    }

    pub async fn applicant_count(&self, posting_id: &PostingId) -> Option<u32> {
        let postings = self.postings.read().await;
        postings.get(posting_id).map(|posting| posting.applicant_count)
    }
}

#[async_trait]
impl JobPostCollaborator for InMemoryJobBoard {
    async fn is_open_for_applications(
        &self,
        posting_id: &PostingId,
    ) -> Result<bool, CollaboratorError> {
        let postings = self.postings.read().await;
        postings
            .get(posting_id)
            .map(PostingRecord::accepts_applications)
            .ok_or_else(|| CollaboratorError::UnknownPosting(posting_id.to_string()))
    }

    async fn increment_applicant_count(
        &self,
        posting_id: &PostingId,
    ) -> Result<CounterUpdate, CollaboratorError> {
        let mut postings = self.postings.write().await;
        let posting = postings
            .get_mut(posting_id)
            .ok_or_else(|| CollaboratorError::UnknownPosting(posting_id.to_string()))?;
        if !posting.accepts_applications() {
            return Ok(CounterUpdate::Closed);
        }
        posting.applicant_count = posting.applicant_count.saturating_add(1);
        Ok(CounterUpdate::Applied {
            count: posting.applicant_count,
        })
    }

    async fn decrement_applicant_count(
        &self,
        posting_id: &PostingId,
    ) -> Result<u32, CollaboratorError> {
        let mut postings = self.postings.write().await;
        let posting = postings
            .get_mut(posting_id)
            .ok_or_else(|| CollaboratorError::UnknownPosting(posting_id.to_string()))?;
        if posting.applicant_count > 0 {
            posting.applicant_count -= 1;
        }
        Ok(posting.applicant_count)
    }

    async fn hourly_rate(&self, posting_id: &PostingId) -> Result<Decimal, CollaboratorError> {
        let postings = self.postings.read().await;
        postings
            .get(posting_id)
            .map(|posting| posting.hourly_rate)
            .ok_or_else(|| CollaboratorError::UnknownPosting(posting_id.to_string()))
    }

    async fn owner(&self, posting_id: &PostingId) -> Result<UserId, CollaboratorError> {
        let postings = self.postings.read().await;
        postings
            .get(posting_id)
            .map(|posting| posting.owner.clone())
            .ok_or_else(|| CollaboratorError::UnknownPosting(posting_id.to_string()))
    }
}

/// Candidate profile collaborator tracking completed profile sections.
#[derive(Default, Clone)]
pub struct InMemoryProfiles {
    completed: Arc<RwLock<HashMap<UserId, BTreeSet<Prerequisite>>>>,
}

impl InMemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn complete(&self, candidate_id: &UserId, section: Prerequisite) {
        let mut completed = self.completed.write().await;
        completed
            .entry(candidate_id.clone())
            .or_default()
            .insert(section);
    }

    pub async fn complete_all(&self, candidate_id: &UserId) {
        for section in Prerequisite::ordered() {
            self.complete(candidate_id, section).await;
        }
    }
}

#[async_trait]
impl CandidateProfileCollaborator for InMemoryProfiles {
    async fn missing_prerequisites(
        &self,
        candidate_id: &UserId,
    ) -> Result<Vec<Prerequisite>, CollaboratorError> {
        let completed = self.completed.read().await;
        let done = completed.get(candidate_id);
        let missing = Prerequisite::ordered()
            .into_iter()
            .filter(|section| done.map_or(true, |done| !done.contains(section)))
            .collect();
        Ok(missing)
    }
}

/// Sink that keeps every emitted notification for later inspection.
#[derive(Default, Clone)]
pub struct RecordingNotifications {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl NotificationSink for RecordingNotifications {
    fn emit(&self, notification: Notification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(notification);
        Ok(())
    }
}

/// Every in-memory adapter wired together, with typed handles kept for seeding and tests.
#[derive(Default, Clone)]
pub struct InMemoryBackend {
    pub applications: InMemoryApplicationStore,
    pub tasks: InMemoryTaskStore,
    pub ledger: InMemoryPaymentLedger,
    pub job_board: InMemoryJobBoard,
    pub profiles: InMemoryProfiles,
    pub notifications: RecordingNotifications,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports sharing state with this backend, optionally routing notifications elsewhere.
    pub fn ports_with_notifications(&self, notifications: SharedNotifications) -> EnginePorts {
        EnginePorts {
            applications: Arc::new(self.applications.clone()),
            tasks: Arc::new(self.tasks.clone()),
            ledger: Arc::new(self.ledger.clone()),
            postings: Arc::new(self.job_board.clone()),
            profiles: Arc::new(self.profiles.clone()),
            notifications,
        }
    }

    pub fn ports(&self) -> EnginePorts {
        self.ports_with_notifications(Arc::new(self.notifications.clone()))
    }
}
