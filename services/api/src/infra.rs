use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use talent_ledger::engagement::memory::InMemoryBackend;
use talent_ledger::engagement::{
    Notification, NotificationError, NotificationSink, PostingId, UserId,
};
use tokio::sync::mpsc;
use tracing::info;

pub(crate) const DEMO_EMPLOYER: &str = "employer-1";
pub(crate) const DEMO_CANDIDATE: &str = "candidate-1";
pub(crate) const DEMO_POSTING: &str = "posting-data-engineer";
pub(crate) const DEMO_HOURLY_RATE: Decimal = Decimal::from_parts(45, 0, 0, false, 0);

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Hands notifications to a background task that writes them to the log.
#[derive(Clone)]
pub(crate) struct LoggingNotifications {
    sender: mpsc::UnboundedSender<Notification>,
}

impl LoggingNotifications {
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Notification>();
        tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                info!(
                    target: "talent_ledger::notifications",
                    user = %notification.target,
                    kind = ?notification.kind,
                    title = %notification.title,
                    "{}",
                    notification.message
                );
            }
        });
        Self { sender }
    }
}

impl NotificationSink for LoggingNotifications {
    fn emit(&self, notification: Notification) -> Result<(), NotificationError> {
        self.sender
            .send(notification)
            .map_err(|_| NotificationError::Transport("notification worker stopped".to_string()))
    }
}

/// Publish an open posting and a fully profiled candidate so the API is usable out of the box.
pub(crate) async fn seed_demo_data(backend: &InMemoryBackend, hourly_rate: Decimal) {
    backend
        .job_board
        .publish(
            PostingId::new(DEMO_POSTING),
            UserId::new(DEMO_EMPLOYER),
            hourly_rate,
        )
        .await;
    backend
        .profiles
        .complete_all(&UserId::new(DEMO_CANDIDATE))
        .await;
    info!(
        posting = DEMO_POSTING,
        employer = DEMO_EMPLOYER,
        candidate = DEMO_CANDIDATE,
        %hourly_rate,
        "seeded demo marketplace data"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use talent_ledger::engagement::{JobPostCollaborator, NotificationKind};

    #[tokio::test]
    async fn seeding_publishes_open_posting() {
        let backend = InMemoryBackend::new();
        seed_demo_data(&backend, Decimal::new(45, 0)).await;

        let posting = PostingId::new(DEMO_POSTING);
        assert!(backend
            .job_board
            .is_open_for_applications(&posting)
            .await
            .expect("posting exists"));
        assert_eq!(
            backend.job_board.hourly_rate(&posting).await.expect("rate"),
            Decimal::new(45, 0)
        );
    }

    #[tokio::test]
    async fn logging_sink_accepts_notifications_while_worker_runs() {
        let sink = LoggingNotifications::spawn();
        let result = sink.emit(Notification {
            target: UserId::new(DEMO_CANDIDATE),
            title: "Payment settled".to_string(),
            message: "3.5 hours settled".to_string(),
            kind: NotificationKind::PaymentSettled,
        });
        assert!(result.is_ok());
    }
}
