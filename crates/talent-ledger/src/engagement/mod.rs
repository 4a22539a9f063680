//! Application, task and payment lifecycle.
//!
//! [`ApplicationLifecycle`] gates candidacies, [`TaskTracker`] records work against approved
//! applications, [`ApprovalGate`] lets employers approve that work and [`SettlementEngine`]
//! batches approved work into immutable ledger rows. Correctness under concurrent requests
//! comes from the guarded writes on the storage ports, never from process-local locks.

pub mod approval;
pub mod domain;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod metrics;
mod notify;
pub mod repository;
pub mod router;
pub mod settlement;
pub mod tracker;

#[cfg(test)]
mod tests;

pub use approval::{ApprovalGate, TaskDecision};
pub use domain::{
    Actor, Application, ApplicationId, ApplicationStatus, ApprovalStatus, Change, Decision,
    PaymentBatch, PaymentBatchId, PostingId, Role, SoftDelete, Task, TaskId, TrackStatus, UserId,
};
pub use engine::{EngagementEngine, EnginePorts};
pub use error::{EngineError, ErrorKind};
pub use lifecycle::ApplicationLifecycle;
pub use metrics::TimeReport;
pub use repository::{
    ApplicationStore, CandidateProfileCollaborator, CollaboratorError, CounterUpdate, Guarded,
    JobPostCollaborator, Notification, NotificationError, NotificationKind, NotificationSink,
    PaymentLedger, Prerequisite, RepositoryError, TaskStore,
};
pub use router::{engagement_router, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
pub use settlement::{SettlementEngine, SettlementHistory, SettlementOutcome, SettlementSummary};
pub use tracker::{TaskSubmission, TaskTracker};
