use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::domain::{
    Actor, Application, ApplicationId, ApplicationStatus, ApprovalStatus, Change, Decision,
    PostingId, Role, UserId,
};
use super::error::EngineError;
use super::notify::dispatch;
use super::repository::{
    CounterUpdate, Guarded, NotificationKind, Prerequisite, RepositoryError,
    SharedApplicationStore, SharedJobPosts, SharedNotifications, SharedProfiles,
};

/// Guarded writes are retried this many times when a concurrent writer wins the race.
const MAX_CAS_ATTEMPTS: usize = 3;

/// Apply, withdraw and approval transitions for candidacies.
pub struct ApplicationLifecycle {
    applications: SharedApplicationStore,
    postings: SharedJobPosts,
    profiles: SharedProfiles,
    notifications: SharedNotifications,
}

impl ApplicationLifecycle {
    pub fn new(
        applications: SharedApplicationStore,
        postings: SharedJobPosts,
        profiles: SharedProfiles,
        notifications: SharedNotifications,
    ) -> Self {
        Self {
            applications,
            postings,
            profiles,
            notifications,
        }
    }

    /// Create a new `Applied` candidacy and bump the posting's applicant counter.
    #[instrument(skip_all, fields(actor = %actor.id, posting = %posting_id))]
    pub async fn apply(
        &self,
        actor: &Actor,
        posting_id: &PostingId,
    ) -> Result<Application, EngineError> {
        if actor.role != Role::Candidate {
            return Err(EngineError::unauthorized("only candidates may apply to postings"));
        }
        let candidate_id = &actor.id;

        if !self.postings.is_open_for_applications(posting_id).await? {
            return Err(closed_posting(posting_id));
        }

        let missing = self.profiles.missing_prerequisites(candidate_id).await?;
        if !missing.is_empty() {
            return Err(EngineError::conflict(format!(
                "candidate profile is incomplete; missing: {}",
                describe_missing(&missing)
            )));
        }

        if self
            .applications
            .find_active(candidate_id, posting_id)
            .await?
            .is_some()
        {
            return Err(duplicate_application(posting_id));
        }

        let count = match self.postings.increment_applicant_count(posting_id).await? {
            CounterUpdate::Applied { count } => count,
            CounterUpdate::Closed => return Err(closed_posting(posting_id)),
        };

        let application = Application::new(candidate_id.clone(), posting_id.clone(), Utc::now());
        if let Err(err) = self
            .applications
            .insert_if_no_active(application.clone())
            .await
        {
            self.release_applicant_slot(posting_id).await;
            return Err(match err {
                RepositoryError::Conflict => duplicate_application(posting_id),
                other => other.into(),
            });
        }

        info!(application = %application.id, applicants = count, "application created");

        match self.postings.owner(posting_id).await {
            Ok(owner) => dispatch(
                self.notifications.as_ref(),
                &owner,
                NotificationKind::ApplicationReceived,
                "New application",
                format!("A candidate applied to posting {posting_id}"),
            ),
            Err(err) => warn!(error = %err, "posting owner unavailable; skipping notification"),
        }

        Ok(application)
    }

    /// Withdraw an `Applied` candidacy on behalf of its owning candidate.
    #[instrument(skip_all, fields(actor = %actor.id, application = %application_id))]
    pub async fn withdraw(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        if !actor.is_candidate(&application.candidate_id) {
            return Err(EngineError::unauthorized(
                "only the candidate who applied may withdraw the application",
            ));
        }

        let withdrawn = match self
            .applications
            .transition_status(
                application_id,
                ApplicationStatus::Applied,
                ApplicationStatus::Withdrawn,
            )
            .await?
        {
            Guarded::Applied(record) => record,
            Guarded::Rejected(current) => {
                return Err(EngineError::conflict(format!(
                    "application is {}; only applied applications can be withdrawn",
                    current.application_status.label()
                )));
            }
            Guarded::Missing => return Err(EngineError::not_found("application", application_id)),
        };

        // The status write already committed; a counter failure is logged, not surfaced.
        match self
            .postings
            .decrement_applicant_count(&withdrawn.posting_id)
            .await
        {
            Ok(count) => info!(applicants = count, "application withdrawn"),
            Err(err) => warn!(
                posting = %withdrawn.posting_id,
                error = %err,
                "application withdrawn but applicant counter was not decremented"
            ),
        }

        Ok(withdrawn)
    }

    /// Record the employer's verdict. Repeating the current verdict is a no-op.
    #[instrument(
        skip_all,
        fields(actor = %actor.id, application = %application_id, decision = ?decision)
    )]
    pub async fn decide_approval(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        decision: Decision,
    ) -> Result<Change<Application>, EngineError> {
        let mut current = self.load(application_id).await?;
        self.authorize_manager(actor, &current).await?;
        let target = ApprovalStatus::from(decision);

        for _ in 0..MAX_CAS_ATTEMPTS {
            if current.approval_status == target {
                debug!("approval already recorded");
                return Ok(Change::unchanged(current));
            }
            if current.application_status == ApplicationStatus::Withdrawn {
                return Err(EngineError::conflict(
                    "application has been withdrawn and can no longer be decided",
                ));
            }

            match self
                .applications
                .compare_and_set_approval(application_id, current.approval_status, target)
                .await?
            {
                Guarded::Applied(updated) => {
                    info!(
                        from = current.approval_status.label(),
                        to = target.label(),
                        "application decided"
                    );
                    dispatch(
                        self.notifications.as_ref(),
                        &updated.candidate_id,
                        NotificationKind::ApplicationDecided,
                        "Application update",
                        format!(
                            "Your application for posting {} was {}",
                            updated.posting_id,
                            target.label()
                        ),
                    );
                    return Ok(Change::changed(updated));
                }
                Guarded::Rejected(latest) => current = latest,
                Guarded::Missing => {
                    return Err(EngineError::not_found("application", application_id));
                }
            }
        }

        Err(EngineError::conflict("application changed concurrently; retry the decision"))
    }

    /// Fetch an application visible to the owning candidate, the posting owner or an admin.
    pub async fn get(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<Application, EngineError> {
        let application = self.load(application_id).await?;
        self.authorize_viewer(actor, &application).await?;
        Ok(application)
    }

    pub async fn list_for_posting(
        &self,
        actor: &Actor,
        posting_id: &PostingId,
    ) -> Result<Vec<Application>, EngineError> {
        let owner = self.postings.owner(posting_id).await?;
        if !actor.manages(&owner) {
            return Err(EngineError::unauthorized(
                "only the posting owner or an administrator may list its applications",
            ));
        }
        Ok(self.applications.list_for_posting(posting_id).await?)
    }

    pub async fn list_for_candidate(
        &self,
        actor: &Actor,
        candidate_id: &UserId,
    ) -> Result<Vec<Application>, EngineError> {
        if !actor.is_candidate(candidate_id) && !actor.is_admin() {
            return Err(EngineError::unauthorized(
                "candidates may only list their own applications",
            ));
        }
        Ok(self.applications.list_for_candidate(candidate_id).await?)
    }

    /// Fresh read of an application; never served from a request-level cache.
    pub(crate) async fn load(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Application, EngineError> {
        self.applications
            .fetch(application_id)
            .await?
            .ok_or_else(|| EngineError::not_found("application", application_id))
    }

    /// Require the posting's owning employer or an administrator.
    pub(crate) async fn authorize_manager(
        &self,
        actor: &Actor,
        application: &Application,
    ) -> Result<(), EngineError> {
        if actor.is_admin() {
            return Ok(());
        }
        let owner = self.postings.owner(&application.posting_id).await?;
        if actor.manages(&owner) {
            Ok(())
        } else {
            Err(EngineError::unauthorized(
                "only the posting owner or an administrator may perform this action",
            ))
        }
    }

    /// Require the owning candidate, the posting's employer or an administrator.
    pub(crate) async fn authorize_viewer(
        &self,
        actor: &Actor,
        application: &Application,
    ) -> Result<(), EngineError> {
        if actor.is_candidate(&application.candidate_id) {
            return Ok(());
        }
        self.authorize_manager(actor, application).await
    }

    pub(crate) async fn hourly_rate(
        &self,
        application: &Application,
    ) -> Result<rust_decimal::Decimal, EngineError> {
        Ok(self.postings.hourly_rate(&application.posting_id).await?)
    }

    pub(crate) fn notifications(&self) -> &SharedNotifications {
        &self.notifications
    }

    async fn release_applicant_slot(&self, posting_id: &PostingId) {
        match self.postings.decrement_applicant_count(posting_id).await {
            Ok(count) => warn!(applicants = count, "application insert failed; counter released"),
            Err(err) => warn!(
                error = %err,
                "application insert failed and applicant counter could not be released"
            ),
        }
    }
}

fn closed_posting(posting_id: &PostingId) -> EngineError {
    EngineError::conflict(format!("posting {posting_id} is not open for applications"))
}

fn duplicate_application(posting_id: &PostingId) -> EngineError {
    EngineError::conflict(format!(
        "candidate already has an active application for posting {posting_id}"
    ))
}

fn describe_missing(missing: &[Prerequisite]) -> String {
    missing
        .iter()
        .map(|section| section.label())
        .collect::<Vec<_>>()
        .join(", ")
}
