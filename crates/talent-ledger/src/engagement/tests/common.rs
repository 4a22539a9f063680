use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::engagement::approval::TaskDecision;
use crate::engagement::domain::{
    Actor, Application, ApplicationId, Decision, PaymentBatch, PaymentBatchId, PostingId, Task,
    UserId,
};
use crate::engagement::engine::EngagementEngine;
use crate::engagement::memory::{InMemoryBackend, InMemoryJobBoard, InMemoryPaymentLedger};
use crate::engagement::metrics::TimeReport;
use crate::engagement::repository::{
    CollaboratorError, CounterUpdate, JobPostCollaborator, Notification, NotificationError,
    NotificationSink, PaymentLedger, RepositoryError,
};
use crate::engagement::tracker::TaskSubmission;

pub(super) const EMPLOYER: &str = "emp-1";
pub(super) const CANDIDATE: &str = "cand-1";
pub(super) const HOURLY_RATE: Decimal = Decimal::from_parts(40, 0, 0, false, 0);

pub(super) fn employer() -> Actor {
    Actor::employer(EMPLOYER)
}

pub(super) fn candidate() -> Actor {
    Actor::candidate(CANDIDATE)
}

pub(super) fn admin() -> Actor {
    Actor::admin("admin-1")
}

pub(super) fn posting() -> PostingId {
    PostingId::new("post-1")
}

pub(super) fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn submission(title: &str, hours: Decimal) -> TaskSubmission {
    TaskSubmission {
        title: title.to_string(),
        description: "Reported work".to_string(),
        attachment_ref: None,
        time: TimeReport::hours(hours),
        progress_percent: None,
    }
}

pub(super) struct Harness {
    pub(super) engine: EngagementEngine,
    pub(super) backend: InMemoryBackend,
}

/// Engine over in-memory adapters with one open posting and one complete candidate profile.
pub(super) async fn harness() -> Harness {
    let backend = InMemoryBackend::new();
    seed(&backend).await;
    let engine = EngagementEngine::new(backend.ports(), &EngineConfig::default());
    Harness { engine, backend }
}

/// Same as [`harness`] but with a caller-supplied ledger.
pub(super) async fn harness_with_ledger(ledger: Arc<dyn PaymentLedger>) -> Harness {
    let backend = InMemoryBackend::new();
    seed(&backend).await;
    let mut ports = backend.ports();
    ports.ledger = ledger;
    let engine = EngagementEngine::new(ports, &EngineConfig::default());
    Harness { engine, backend }
}

/// Same as [`harness`] but every notification fails to send.
pub(super) async fn harness_with_failing_notifications() -> Harness {
    let backend = InMemoryBackend::new();
    seed(&backend).await;
    let ports = backend.ports_with_notifications(Arc::new(FailingNotifications));
    let engine = EngagementEngine::new(ports, &EngineConfig::default());
    Harness { engine, backend }
}

/// Same as [`harness`] but the applicant counter can never be decremented.
pub(super) async fn harness_with_stuck_counter() -> Harness {
    let backend = InMemoryBackend::new();
    seed(&backend).await;
    let mut ports = backend.ports();
    ports.postings = Arc::new(StuckCounter(backend.job_board.clone()));
    let engine = EngagementEngine::new(ports, &EngineConfig::default());
    Harness { engine, backend }
}

async fn seed(backend: &InMemoryBackend) {
    backend
        .job_board
        .publish(posting(), UserId::new(EMPLOYER), HOURLY_RATE)
        .await;
    backend.profiles.complete_all(&UserId::new(CANDIDATE)).await;
}

impl Harness {
    pub(super) async fn applicant_count(&self) -> u32 {
        self.backend
            .job_board
            .applicant_count(&posting())
            .await
            .expect("posting exists")
    }

    pub(super) async fn application(&self) -> Application {
        self.engine
            .lifecycle()
            .apply(&candidate(), &posting())
            .await
            .expect("candidate can apply")
    }

    pub(super) async fn approved_application(&self) -> Application {
        let application = self.application().await;
        self.engine
            .lifecycle()
            .decide_approval(&employer(), &application.id, Decision::Approved)
            .await
            .expect("employer approves")
            .record
    }

    pub(super) async fn submit(&self, application_id: &ApplicationId, hours: Decimal) -> Task {
        self.engine
            .tracker()
            .submit(
                &candidate(),
                application_id,
                submission("Build report", hours),
            )
            .await
            .expect("task submitted")
    }

    pub(super) async fn approved_task(
        &self,
        application_id: &ApplicationId,
        hours: Decimal,
    ) -> Task {
        let task = self.submit(application_id, hours).await;
        self.engine
            .approvals()
            .decide(&employer(), &task.id, TaskDecision::approve())
            .await
            .expect("employer approves task")
            .record
    }

    pub(super) async fn batches(&self, application_id: &ApplicationId) -> Vec<PaymentBatch> {
        self.backend
            .ledger
            .list_for_application(application_id)
            .await
            .expect("ledger readable")
    }
}

pub(super) struct FailingNotifications;

impl NotificationSink for FailingNotifications {
    fn emit(&self, _notification: Notification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

/// Ledger whose appends can be made to fail, for partial-failure scenarios.
#[derive(Default, Clone)]
pub(super) struct FlakyLedger {
    pub(super) inner: InMemoryPaymentLedger,
    pub(super) fail_appends: Arc<AtomicBool>,
}

impl FlakyLedger {
    pub(super) fn set_failing(&self, failing: bool) {
        self.fail_appends.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentLedger for FlakyLedger {
    async fn append_if_absent(&self, batch: PaymentBatch) -> Result<bool, RepositoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("ledger offline".to_string()));
        }
        self.inner.append_if_absent(batch).await
    }

    async fn fetch(&self, id: &PaymentBatchId) -> Result<Option<PaymentBatch>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn list_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Vec<PaymentBatch>, RepositoryError> {
        self.inner.list_for_application(application_id).await
    }
}

/// Job board whose counter decrements always fail.
struct StuckCounter(InMemoryJobBoard);

#[async_trait]
impl JobPostCollaborator for StuckCounter {
    async fn is_open_for_applications(
        &self,
        posting_id: &PostingId,
    ) -> Result<bool, CollaboratorError> {
        self.0.is_open_for_applications(posting_id).await
    }

    async fn increment_applicant_count(
        &self,
        posting_id: &PostingId,
    ) -> Result<CounterUpdate, CollaboratorError> {
        self.0.increment_applicant_count(posting_id).await
    }

    async fn decrement_applicant_count(
        &self,
        _posting_id: &PostingId,
    ) -> Result<u32, CollaboratorError> {
        Err(CollaboratorError::Unavailable("counter service offline".to_string()))
    }

    async fn hourly_rate(&self, posting_id: &PostingId) -> Result<Decimal, CollaboratorError> {
        self.0.hourly_rate(posting_id).await
    }

    async fn owner(&self, posting_id: &PostingId) -> Result<UserId, CollaboratorError> {
        self.0.owner(posting_id).await
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
