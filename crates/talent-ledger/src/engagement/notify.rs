use tracing::warn;

use super::domain::UserId;
use super::repository::{Notification, NotificationKind, NotificationSink};

/// Hand a notification to the sink. Failures are logged and never reach the caller.
pub(crate) fn dispatch(
    sink: &dyn NotificationSink,
    target: &UserId,
    kind: NotificationKind,
    title: impl Into<String>,
    message: impl Into<String>,
) {
    let notification = Notification {
        target: target.clone(),
        title: title.into(),
        message: message.into(),
        kind,
    };

    if let Err(err) = sink.emit(notification) {
        warn!(%target, ?kind, error = %err, "notification dropped");
    }
}
