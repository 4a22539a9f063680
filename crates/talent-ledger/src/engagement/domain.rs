use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier of a candidacy record.
    ApplicationId
);
string_id!(
    /// Identifier of a reported unit of work.
    TaskId
);
string_id!(
    /// Identifier of a settlement ledger row.
    PaymentBatchId
);
string_id!(
    /// Identifier of a job posting owned by the posting collaborator.
    PostingId
);
string_id!(
    /// Identifier of a verified user (candidate, employer or administrator).
    UserId
);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl PaymentBatchId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Role attached to a verified identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Candidate,
    Employer,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Candidate => "candidate",
            Role::Employer => "employer",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "candidate" => Ok(Role::Candidate),
            "employer" => Ok(Role::Employer),
            "admin" | "administrator" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Already-authenticated caller identity handed to every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId(id.into()),
            role,
        }
    }

    pub fn candidate(id: impl Into<String>) -> Self {
        Self::new(id, Role::Candidate)
    }

    pub fn employer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Employer)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the actor is the given candidate acting in the candidate role.
    pub fn is_candidate(&self, candidate_id: &UserId) -> bool {
        self.role == Role::Candidate && &self.id == candidate_id
    }

    /// True when the actor owns the posting or is an administrator.
    pub fn manages(&self, owner_id: &UserId) -> bool {
        self.is_admin() || (self.role == Role::Employer && &self.id == owner_id)
    }
}

/// Candidate-side state of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Applied,
    Withdrawn,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }
}

/// Employer-side review state shared by applications and tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Verdict an employer or administrator may record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl From<Decision> for ApprovalStatus {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
        }
    }
}

/// Schedule health of a task, derived from its reported progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    OnTrack,
    OffTrack,
    AtRisk,
}

/// Uniform soft-delete marker filtered by every store read path.
pub trait SoftDelete {
    fn removed_at(&self) -> Option<DateTime<Utc>>;

    fn is_live(&self) -> bool {
        self.removed_at().is_none()
    }
}

/// One candidacy of a candidate for a posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub candidate_id: UserId,
    pub posting_id: PostingId,
    pub application_status: ApplicationStatus,
    pub approval_status: ApprovalStatus,
    pub applied_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
}

impl Application {
    pub fn new(candidate_id: UserId, posting_id: PostingId, now: DateTime<Utc>) -> Self {
        Self {
            id: ApplicationId::generate(),
            candidate_id,
            posting_id,
            application_status: ApplicationStatus::Applied,
            approval_status: ApprovalStatus::Pending,
            applied_at: now,
            created_at: now,
            updated_at: now,
            removed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.application_status == ApplicationStatus::Applied && self.is_live()
    }

    pub fn is_approved(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved
    }
}

impl SoftDelete for Application {
    fn removed_at(&self) -> Option<DateTime<Utc>> {
        self.removed_at
    }
}

/// A reported, time-bounded unit of work against an approved application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub application_id: ApplicationId,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub reported_hours: Decimal,
    pub progress_percent: u8,
    pub track_status: TrackStatus,
    pub approval_status: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    pub is_paid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_batch_id: Option<PaymentBatchId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Settlement only ever selects approved tasks whose flag differs from the target.
    pub fn is_settleable_to(&self, to_paid: bool) -> bool {
        self.is_live()
            && self.approval_status == ApprovalStatus::Approved
            && self.is_paid != to_paid
    }
}

impl SoftDelete for Task {
    fn removed_at(&self) -> Option<DateTime<Utc>> {
        self.removed_at
    }
}

/// Immutable settlement record aggregating newly paid tasks of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentBatch {
    pub id: PaymentBatchId,
    pub application_id: ApplicationId,
    pub task_ids: Vec<TaskId>,
    pub total_hours: Decimal,
    pub hourly_rate: Decimal,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
}

impl SoftDelete for PaymentBatch {
    fn removed_at(&self) -> Option<DateTime<Utc>> {
        self.removed_at
    }
}

/// Result of a mutating operation; `changed == false` marks an idempotent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change<T> {
    pub record: T,
    pub changed: bool,
}

impl<T> Change<T> {
    pub fn changed(record: T) -> Self {
        Self {
            record,
            changed: true,
        }
    }

    pub fn unchanged(record: T) -> Self {
        Self {
            record,
            changed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_header_values() {
        assert_eq!("Employer".parse::<Role>(), Ok(Role::Employer));
        assert_eq!(" administrator ".parse::<Role>(), Ok(Role::Admin));
        assert!("recruiter".parse::<Role>().is_err());
    }

    #[test]
    fn actor_manages_only_owned_postings() {
        let owner = UserId::new("emp-1");
        assert!(Actor::employer("emp-1").manages(&owner));
        assert!(!Actor::employer("emp-2").manages(&owner));
        assert!(Actor::admin("root").manages(&owner));
        // A candidate sharing the owner's id still lacks the employer role.
        assert!(!Actor::candidate("emp-1").manages(&owner));
    }

    #[test]
    fn new_application_starts_applied_and_pending() {
        let now = Utc::now();
        let app = Application::new(UserId::new("cand-1"), PostingId::new("post-1"), now);
        assert_eq!(app.application_status, ApplicationStatus::Applied);
        assert_eq!(app.approval_status, ApprovalStatus::Pending);
        assert_eq!(app.applied_at, now);
        assert!(app.is_active());
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&TaskId::new("task-7")).expect("serializes");
        assert_eq!(json, "\"task-7\"");
    }
}
