use async_trait::async_trait;
use tracing::info;

use crate::models::incident::IncidentKind;

/// What administrators are told when an incident is submitted.
#[derive(Clone, Debug)]
pub struct NewIncidentNotice {
    pub incident_id: String,
    pub subject_label: String,
    pub home_label: String,
    pub kind: IncidentKind,
    pub reporter_label: String,
}

#[derive(Debug, thiserror::Error)]
#[error("notification not delivered: {0}")]
pub struct NotificationError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_admins_of_new_incident(
        &self,
        notice: &NewIncidentNotice,
    ) -> Result<(), NotificationError>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_admins_of_new_incident(
        &self,
        notice: &NewIncidentNotice,
    ) -> Result<(), NotificationError> {
        info!(
            incident_id = %notice.incident_id,
            home = %notice.home_label,
            reporter = %notice.reporter_label,
            "new {} incident for {}",
            notice.kind.label(),
            notice.subject_label
        );
        Ok(())
    }
}
