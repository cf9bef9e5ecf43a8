use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::models::actor::Actor;

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    IncidentCreated,
    IncidentUpdated,
    IncidentSubmitted,
    IncidentStatusChanged,
    IncidentFollowUpAdded,
    IncidentDeleted,
    PhotoUploadStarted,
    PhotoUploadConfirmed,
    PhotoUploadCancelled,
    PhotoDeleted,
}
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditResource {
    Incident,
    IncidentPhoto,
}

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub actor_id: String,
    pub actor_label: String,
    pub resource_type: AuditResource,
    pub resource_id: String,
    pub outcome: AuditOutcome,
    pub source_address: Option<String>,
    pub detail: String,
}

#[derive(Debug, thiserror::Error)]
#[error("audit sink unavailable: {0}")]
pub struct AuditError(pub String);

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record_event(&self, event: AuditEvent) -> Result<(), AuditError>;
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        actor: &Actor,
        resource_type: AuditResource,
        resource_id: &ObjectId,
    ) -> Self {
        AuditEvent {
            action,
            actor_id: actor.id.to_hex(),
            actor_label: actor.name.clone(),
            resource_type,
            resource_id: resource_id.to_hex(),
            outcome: AuditOutcome::Success,
            source_address: actor.source_address.clone(),
            detail: String::new(),
        }
    }
    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuditAction::IncidentCreated => "incident_created",
            AuditAction::IncidentUpdated => "incident_updated",
            AuditAction::IncidentSubmitted => "incident_submitted",
            AuditAction::IncidentStatusChanged => "incident_status_changed",
            AuditAction::IncidentFollowUpAdded => "incident_follow_up_added",
            AuditAction::IncidentDeleted => "incident_deleted",
            AuditAction::PhotoUploadStarted => "photo_upload_started",
            AuditAction::PhotoUploadConfirmed => "photo_upload_confirmed",
            AuditAction::PhotoUploadCancelled => "photo_upload_cancelled",
            AuditAction::PhotoDeleted => "photo_deleted",
        };
        write!(f, "{}", label)
    }
}

/// Records an event without letting a sink failure reach the caller.
pub async fn record(log: &dyn AuditLog, event: AuditEvent) {
    let action = event.action;
    let resource_id = event.resource_id.clone();
    if let Err(error) = log.record_event(event).await {
        warn!(%action, %resource_id, "audit event dropped: {}", error);
    }
}

/// Emits audit events as structured `tracing` records on the `audit` target.
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn record_event(&self, event: AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "audit",
            action = %event.action,
            actor_id = %event.actor_id,
            actor_label = %event.actor_label,
            resource_type = ?event.resource_type,
            resource_id = %event.resource_id,
            outcome = ?event.outcome,
            source_address = event.source_address.as_deref().unwrap_or("-"),
            "{}",
            event.detail
        );
        Ok(())
    }
}
