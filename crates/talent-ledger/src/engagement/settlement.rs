use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::domain::{
    Actor, Application, ApplicationId, ApprovalStatus, PaymentBatch, PaymentBatchId, Task, TaskId,
};
use super::error::EngineError;
use super::lifecycle::ApplicationLifecycle;
use super::metrics::{round2, settlement_amount};
use super::notify::dispatch;
use super::repository::{NotificationKind, SharedPaymentLedger, SharedTaskStore};

/// Result of a `set_paid_flag` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementOutcome {
    pub application_id: ApplicationId,
    pub is_paid: bool,
    /// False when no eligible task needed to change.
    pub changed: bool,
    pub affected_tasks: Vec<TaskId>,
    pub total_hours: Decimal,
    pub total_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<PaymentBatch>,
    pub message: String,
}

/// Aggregate view of an application's approved work and settlements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementSummary {
    pub approved_hours: Decimal,
    pub paid_hours: Decimal,
    pub unpaid_hours: Decimal,
    pub settled_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettlementHistory {
    pub application_id: ApplicationId,
    pub batches: Vec<PaymentBatch>,
    pub summary: SettlementSummary,
}

/// Sole writer of the payment ledger.
pub struct SettlementEngine {
    tasks: SharedTaskStore,
    ledger: SharedPaymentLedger,
    lifecycle: Arc<ApplicationLifecycle>,
}

impl SettlementEngine {
    pub fn new(
        tasks: SharedTaskStore,
        ledger: SharedPaymentLedger,
        lifecycle: Arc<ApplicationLifecycle>,
    ) -> Self {
        Self {
            tasks,
            ledger,
            lifecycle,
        }
    }

    /// Flip `is_paid` on every approved task whose flag differs from `is_paid`.
    ///
    /// Paying creates exactly one ledger batch for the flipped set. Unpaying only corrects
    /// the task flags; existing batches are never adjusted or removed.
    #[instrument(
        skip_all,
        fields(actor = %actor.id, application = %application_id, is_paid = is_paid)
    )]
    pub async fn set_paid_flag(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
        is_paid: bool,
    ) -> Result<SettlementOutcome, EngineError> {
        let application = self.lifecycle.load(application_id).await?;
        self.lifecycle.authorize_manager(actor, &application).await?;

        // Read the rate before any write so a collaborator failure leaves no partial state.
        let hourly_rate = self.lifecycle.hourly_rate(&application).await?;

        if is_paid {
            self.recover_unrecorded_batches(&application, hourly_rate)
                .await?;
        }

        let batch_id = is_paid.then(PaymentBatchId::generate);
        let claimed = self
            .tasks
            .claim_for_settlement(application_id, is_paid, batch_id.clone())
            .await?;

        if claimed.is_empty() {
            debug!("no eligible tasks to settle");
            return Ok(SettlementOutcome {
                application_id: application_id.clone(),
                is_paid,
                changed: false,
                affected_tasks: Vec::new(),
                total_hours: Decimal::ZERO,
                total_amount: Decimal::ZERO,
                batch: None,
                message: format!("No change: isPaid is already {is_paid} for all eligible tasks"),
            });
        }

        let total_hours = total_hours(&claimed);
        let total_amount = settlement_amount(total_hours, hourly_rate);
        let affected_tasks: Vec<TaskId> = claimed.iter().map(|task| task.id.clone()).collect();

        let batch = match batch_id {
            Some(batch_id) => {
                let batch = PaymentBatch {
                    id: batch_id,
                    application_id: application_id.clone(),
                    task_ids: affected_tasks.clone(),
                    total_hours,
                    hourly_rate,
                    total_amount,
                    created_at: Utc::now(),
                    removed_at: None,
                };
                self.append(batch.clone()).await?;
                info!(
                    batch = %batch.id,
                    tasks = affected_tasks.len(),
                    hours = %total_hours,
                    amount = %total_amount,
                    "payment batch recorded"
                );
                dispatch(
                    self.lifecycle.notifications().as_ref(),
                    &application.candidate_id,
                    NotificationKind::PaymentSettled,
                    "Payment settled",
                    format!(
                        "{total_hours} hours settled for {total_amount} on application {application_id}"
                    ),
                );
                Some(batch)
            }
            None => {
                info!(
                    tasks = affected_tasks.len(),
                    hours = %total_hours,
                    "tasks marked unpaid; ledger left untouched"
                );
                None
            }
        };

        let message = if is_paid {
            format!("Marked {} task(s) as paid", affected_tasks.len())
        } else {
            format!("Marked {} task(s) as unpaid", affected_tasks.len())
        };

        Ok(SettlementOutcome {
            application_id: application_id.clone(),
            is_paid,
            changed: true,
            affected_tasks,
            total_hours,
            total_amount,
            batch,
            message,
        })
    }

    /// Ledger rows plus hour/amount totals for an application.
    pub async fn history(
        &self,
        actor: &Actor,
        application_id: &ApplicationId,
    ) -> Result<SettlementHistory, EngineError> {
        let application = self.lifecycle.load(application_id).await?;
        self.lifecycle.authorize_viewer(actor, &application).await?;

        let batches = self.ledger.list_for_application(application_id).await?;
        let tasks = self.tasks.list_for_application(application_id).await?;
        let summary = summarize(&tasks, &batches);

        Ok(SettlementHistory {
            application_id: application_id.clone(),
            batches,
            summary,
        })
    }

    async fn append(&self, batch: PaymentBatch) -> Result<(), EngineError> {
        let batch_id = batch.id.clone();
        match self.ledger.append_if_absent(batch).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(batch = %batch_id, "batch already recorded");
                Ok(())
            }
            Err(err) => {
                // Tasks keep their batch id, so the next paid call re-appends this batch.
                error!(batch = %batch_id, error = %err, "tasks claimed but batch not recorded");
                Err(err.into())
            }
        }
    }

    /// Re-append batches whose tasks were claimed but whose ledger row never landed.
    async fn recover_unrecorded_batches(
        &self,
        application: &Application,
        hourly_rate: Decimal,
    ) -> Result<(), EngineError> {
        let tasks = self.tasks.list_for_application(&application.id).await?;
        let mut claims: BTreeMap<PaymentBatchId, Vec<&Task>> = BTreeMap::new();
        for task in tasks.iter().filter(|task| task.is_paid) {
            if let Some(batch_id) = &task.payment_batch_id {
                claims.entry(batch_id.clone()).or_default().push(task);
            }
        }

        for (batch_id, claimed) in claims {
            if self.ledger.fetch(&batch_id).await?.is_some() {
                continue;
            }
            let owned: Vec<Task> = claimed.into_iter().cloned().collect();
            let total_hours = total_hours(&owned);
            let batch = PaymentBatch {
                id: batch_id,
                application_id: application.id.clone(),
                task_ids: owned.iter().map(|task| task.id.clone()).collect(),
                total_hours,
                hourly_rate,
                total_amount: settlement_amount(total_hours, hourly_rate),
                created_at: Utc::now(),
                removed_at: None,
            };
            warn!(
                batch = %batch.id,
                tasks = batch.task_ids.len(),
                "recovering unrecorded payment batch"
            );
            self.append(batch).await?;
        }

        Ok(())
    }
}

fn total_hours(tasks: &[Task]) -> Decimal {
    round2(tasks.iter().map(|task| task.reported_hours).sum())
}

fn summarize(tasks: &[Task], batches: &[PaymentBatch]) -> SettlementSummary {
    let approved: Vec<&Task> = tasks
        .iter()
        .filter(|task| task.approval_status == ApprovalStatus::Approved)
        .collect();
    let approved_hours: Decimal = approved.iter().map(|task| task.reported_hours).sum();
    let paid_hours: Decimal = approved
        .iter()
        .filter(|task| task.is_paid)
        .map(|task| task.reported_hours)
        .sum();
    let settled_amount: Decimal = batches.iter().map(|batch| batch.total_amount).sum();

    SettlementSummary {
        approved_hours: round2(approved_hours),
        paid_hours: round2(paid_hours),
        unpaid_hours: round2(approved_hours - paid_hours),
        settled_amount: round2(settled_amount),
    }
}
