use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::common::{candidate, employer, harness, harness_with_ledger, FlakyLedger, HOURLY_RATE};
use crate::engagement::domain::{Actor, ApprovalStatus};
use crate::engagement::error::ErrorKind;
use crate::engagement::repository::{NotificationKind, PaymentLedger};

#[tokio::test]
async fn paying_approved_work_records_one_batch() {
    let h = harness().await;
    let application = h.approved_application().await;
    let first = h.approved_task(&application.id, dec!(2)).await;
    let second = h.approved_task(&application.id, dec!(1.5)).await;
    let pending = h.submit(&application.id, dec!(4)).await;

    let outcome = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.affected_tasks, vec![first.id.clone(), second.id.clone()]);
    assert_eq!(outcome.total_hours, dec!(3.5));
    assert_eq!(outcome.total_amount, dec!(140));

    let batch = outcome.batch.expect("paid settlement records a batch");
    assert_eq!(batch.hourly_rate, HOURLY_RATE);
    assert_eq!(batch.task_ids, outcome.affected_tasks);
    assert_eq!(h.batches(&application.id).await, vec![batch.clone()]);

    let tasks = h
        .engine
        .tracker()
        .list(&employer(), &application.id)
        .await
        .unwrap();
    for task in &tasks {
        if task.id == pending.id {
            assert!(!task.is_paid);
            assert_eq!(task.approval_status, ApprovalStatus::Pending);
        } else {
            assert!(task.is_paid);
            assert_eq!(task.payment_batch_id.as_ref(), Some(&batch.id));
        }
    }

    assert!(h
        .backend
        .notifications
        .events()
        .iter()
        .any(|event| event.kind == NotificationKind::PaymentSettled));
}

#[tokio::test]
async fn repeating_a_paid_settlement_is_a_no_op() {
    let h = harness().await;
    let application = h.approved_application().await;
    h.approved_task(&application.id, dec!(2)).await;
    h.engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();

    let repeat = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();

    assert!(!repeat.changed);
    assert!(repeat.batch.is_none());
    assert!(repeat.affected_tasks.is_empty());
    assert_eq!(
        repeat.message,
        "No change: isPaid is already true for all eligible tasks"
    );
    assert_eq!(h.batches(&application.id).await.len(), 1);
}

#[tokio::test]
async fn settling_without_approved_tasks_changes_nothing() {
    let h = harness().await;
    let application = h.approved_application().await;
    h.submit(&application.id, dec!(3)).await;

    let outcome = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();

    assert!(!outcome.changed);
    assert_eq!(outcome.total_amount, Decimal::ZERO);
    assert!(h.batches(&application.id).await.is_empty());
}

#[tokio::test]
async fn unpaying_leaves_the_ledger_untouched() {
    let h = harness().await;
    let application = h.approved_application().await;
    h.approved_task(&application.id, dec!(2)).await;
    h.engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();

    let unpaid = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, false)
        .await
        .unwrap();

    assert!(unpaid.changed);
    assert!(unpaid.batch.is_none());
    assert_eq!(unpaid.affected_tasks.len(), 1);
    assert_eq!(h.batches(&application.id).await.len(), 1);

    let task = &h
        .engine
        .tracker()
        .list(&employer(), &application.id)
        .await
        .unwrap()[0];
    assert!(!task.is_paid);
    assert!(task.payment_batch_id.is_none());

    let repaid = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();
    assert!(repaid.changed);
    assert_eq!(h.batches(&application.id).await.len(), 2);
}

#[tokio::test]
async fn later_approvals_settle_into_a_new_batch() {
    let h = harness().await;
    let application = h.approved_application().await;
    h.approved_task(&application.id, dec!(2)).await;
    let first = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();

    let late = h.approved_task(&application.id, dec!(0.75)).await;
    let second = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();

    assert_eq!(second.affected_tasks, vec![late.id]);
    assert_eq!(second.total_amount, dec!(30));
    assert_ne!(
        first.batch.map(|batch| batch.id),
        second.batch.map(|batch| batch.id)
    );
}

#[tokio::test]
async fn only_managers_settle_but_candidates_see_history() {
    let h = harness().await;
    let application = h.approved_application().await;
    h.approved_task(&application.id, dec!(2)).await;

    for actor in [candidate(), Actor::employer("emp-2")] {
        let err = h
            .engine
            .settlement()
            .set_paid_flag(&actor, &application.id, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationError);
    }
    assert!(h.batches(&application.id).await.is_empty());

    h.engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();
    h.approved_task(&application.id, dec!(1)).await;

    let history = h
        .engine
        .settlement()
        .history(&candidate(), &application.id)
        .await
        .unwrap();
    assert_eq!(history.batches.len(), 1);
    assert_eq!(history.summary.approved_hours, dec!(3));
    assert_eq!(history.summary.paid_hours, dec!(2));
    assert_eq!(history.summary.unpaid_hours, dec!(1));
    assert_eq!(history.summary.settled_amount, dec!(80));
}

#[tokio::test]
async fn ledger_failure_is_recovered_on_the_next_paid_call() {
    let ledger = FlakyLedger::default();
    let h = harness_with_ledger(Arc::new(ledger.clone())).await;
    let application = h.approved_application().await;
    let task = h.approved_task(&application.id, dec!(2.5)).await;

    ledger.set_failing(true);
    let err = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientStorageError);
    assert!(err.is_retryable());

    let claimed = h.engine.tracker().get(&employer(), &task.id).await.unwrap();
    assert!(claimed.is_paid);
    let orphan_batch = claimed.payment_batch_id.expect("claim stamps the batch id");
    assert!(ledger
        .list_for_application(&application.id)
        .await
        .unwrap()
        .is_empty());

    ledger.set_failing(false);
    let retry = h
        .engine
        .settlement()
        .set_paid_flag(&employer(), &application.id, true)
        .await
        .unwrap();
    assert!(!retry.changed);

    let recovered = ledger.fetch(&orphan_batch).await.unwrap().expect("batch recovered");
    assert_eq!(recovered.task_ids, vec![task.id]);
    assert_eq!(recovered.total_hours, dec!(2.5));
    assert_eq!(recovered.total_amount, dec!(100));

    let batches = ledger.list_for_application(&application.id).await.unwrap();
    assert_eq!(batches.len(), 1);
}

#[tokio::test]
async fn concurrent_paid_calls_record_a_single_batch() {
    let h = harness().await;
    let application = h.approved_application().await;
    h.approved_task(&application.id, dec!(2)).await;
    h.approved_task(&application.id, dec!(3)).await;

    let engine = Arc::new(h.engine);
    let calls: Vec<_> = (0..6)
        .map(|_| {
            let engine = engine.clone();
            let application_id = application.id.clone();
            tokio::spawn(async move {
                engine
                    .settlement()
                    .set_paid_flag(&employer(), &application_id, true)
                    .await
            })
        })
        .collect();

    let mut changed = 0;
    for call in calls {
        if call.await.expect("task joins").unwrap().changed {
            changed += 1;
        }
    }

    assert_eq!(changed, 1);
    let batches = h.backend.ledger.list_for_application(&application.id).await.unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].total_hours, dec!(5));
    assert_eq!(batches[0].total_amount, dec!(200));
}
