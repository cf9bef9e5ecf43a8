use mongodb::bson::{oid::ObjectId, DateTime};
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    access::{ensure_admin, ensure_editable_draft, ensure_visible, find_visible, IncidentScope},
    attachments::AttachmentCoordinator,
    reference,
};
use crate::{
    error::{IncidentError, IncidentResult},
    models::{
        actor::Actor,
        incident::{
            Incident, IncidentFollowUp, IncidentFollowUpRequest, IncidentFollowUpResponse,
            IncidentPageResponse, IncidentQuery, IncidentQueryParams, IncidentRequest,
            IncidentResponse, IncidentStatus, IncidentStatusRequest, IncidentUpdateRequest,
            SEVERITY_MAX, SEVERITY_MIN,
        },
        resident::Resident,
    },
    services::{
        audit::{self, AuditAction, AuditEvent, AuditLog, AuditOutcome, AuditResource},
        blob::BlobStore,
        notification::{NewIncidentNotice, Notifier},
    },
    store::IncidentStore,
};

pub const DEFAULT_PAGE_SIZE: u64 = 25;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Entry point for every incident operation.
pub struct IncidentLifecycleManager {
    store: Arc<dyn IncidentStore>,
    attachments: AttachmentCoordinator,
    audit: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
}

fn parse_id(value: &str, error: &str) -> IncidentResult<ObjectId> {
    ObjectId::parse_str(value).map_err(|_| IncidentError::Validation(error.to_string()))
}

fn required_text(value: &str, error: &str) -> IncidentResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(IncidentError::Validation(error.to_string()));
    }
    Ok(value.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn validate_severity(severity: i32) -> IncidentResult<i32> {
    if !(SEVERITY_MIN..=SEVERITY_MAX).contains(&severity) {
        return Err(IncidentError::Validation(
            "SEVERITY_OUT_OF_RANGE".to_string(),
        ));
    }
    Ok(severity)
}

impl IncidentQueryParams {
    /// Resolves the query string into a store query and the effective
    /// `(page, page_size)`.
    pub fn into_query(self) -> IncidentResult<(IncidentQuery, u64, u64)> {
        let page = self.page.unwrap_or(1);
        if page == 0 {
            return Err(IncidentError::Validation("INVALID_PAGE".to_string()));
        }
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(IncidentError::Validation("INVALID_PAGE_SIZE".to_string()));
        }

        let query: IncidentQuery = IncidentQuery {
            home_id: match self.home_id {
                Some(home_id) => Some(parse_id(&home_id, "INVALID_HOME_ID")?),
                None => None,
            },
            resident_id: match self.resident_id {
                Some(resident_id) => Some(parse_id(&resident_id, "INVALID_RESIDENT_ID")?),
                None => None,
            },
            status: self.status,
            kind: self.kind,
            occurred_from: self.occurred_from.map(DateTime::from_chrono),
            occurred_to: self.occurred_to.map(DateTime::from_chrono),
            skip: (page - 1) * page_size,
            limit: page_size,
        };
        Ok((query, page, page_size))
    }
}

impl IncidentLifecycleManager {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        blobs: Arc<dyn BlobStore>,
        audit: Arc<dyn AuditLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        IncidentLifecycleManager {
            attachments: AttachmentCoordinator::new(store.clone(), blobs, audit.clone()),
            store,
            audit,
            notifier,
        }
    }

    pub fn attachments(&self) -> &AttachmentCoordinator {
        &self.attachments
    }

    async fn active_resident(
        &self,
        resident_id: &ObjectId,
        home_id: &ObjectId,
    ) -> IncidentResult<Resident> {
        match self.store.find_resident(resident_id).await? {
            Some(resident) if resident.is_active && &resident.home_id == home_id => Ok(resident),
            _ => Err(IncidentError::NotFound("RESIDENT_NOT_FOUND".to_string())),
        }
    }

    async fn response(&self, incident: &Incident) -> IncidentResult<IncidentResponse> {
        let follow_ups = self.store.find_follow_ups(&incident._id).await?;
        let photos = self.attachments.confirmed_photos(&incident._id).await?;
        Ok(incident.to_response(follow_ups, photos))
    }

    async fn notify_admins(&self, incident: &Incident, actor: &Actor) {
        let home_label = match self.store.find_home(&incident.home_id).await {
            Ok(Some(home)) => home.name,
            _ => incident.home_id.to_hex(),
        };
        let subject_label = match incident.resident_id {
            Some(resident_id) => match self.store.find_resident(&resident_id).await {
                Ok(Some(resident)) => resident.display_name(),
                _ => resident_id.to_hex(),
            },
            None => "Home-level incident".to_string(),
        };

        let notice: NewIncidentNotice = NewIncidentNotice {
            incident_id: incident._id.to_hex(),
            subject_label,
            home_label,
            kind: incident.kind,
            reporter_label: actor.name.clone(),
        };
        if let Err(error) = self.notifier.notify_admins_of_new_incident(&notice).await {
            warn!(incident = %incident.reference_number, "admin notification failed: {}", error);
        }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        request: IncidentRequest,
    ) -> IncidentResult<IncidentResponse> {
        let location = required_text(&request.location, "LOCATION_REQUIRED")?;
        let description = required_text(&request.description, "DESCRIPTION_REQUIRED")?;
        let severity = validate_severity(request.severity)?;
        let home_id = parse_id(&request.home_id, "INVALID_HOME_ID")?;
        let resident_id = match &request.resident_id {
            Some(resident_id) => Some(parse_id(resident_id, "INVALID_RESIDENT_ID")?),
            None => None,
        };

        if !actor.can_access_home(&home_id) {
            return Err(IncidentError::Authorization("HOME_NOT_PERMITTED".to_string()));
        }
        match self.store.find_home(&home_id).await? {
            Some(home) if home.is_active => (),
            _ => return Err(IncidentError::NotFound("HOME_NOT_FOUND".to_string())),
        }
        if let Some(resident_id) = &resident_id {
            self.active_resident(resident_id, &home_id).await?;
        }

        let reference_number =
            reference::assign(self.store.as_ref(), request.kind, &home_id).await?;

        let now = DateTime::now();
        let status = if request.submit {
            IncidentStatus::Submitted
        } else {
            IncidentStatus::Draft
        };
        let incident: Incident = Incident {
            _id: ObjectId::new(),
            reference_number,
            resident_id,
            home_id,
            reported_by_id: actor.id,
            kind: request.kind,
            severity,
            occurred_at: DateTime::from_chrono(request.occurred_at),
            location,
            description,
            actions_taken: optional_text(request.actions_taken),
            witness_names: optional_text(request.witness_names),
            notified_parties: optional_text(request.notified_parties),
            status,
            closed_by_id: None,
            closed_at: None,
            closure_notes: None,
            admin_notified_at: if request.submit { Some(now) } else { None },
            created_at: now,
            updated_at: now,
        };
        self.store.insert_incident(&incident).await?;
        info!(incident = %incident.reference_number, status = status.label(), "incident created");

        if request.submit {
            self.notify_admins(&incident, actor).await;
        }
        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::IncidentCreated,
                actor,
                AuditResource::Incident,
                &incident._id,
            )
            .detail(format!("{} created as {}", incident.reference_number, status.label())),
        )
        .await;

        Ok(incident.to_response(Vec::new(), Vec::new()))
    }

    pub async fn get(&self, actor: &Actor, incident_id: &ObjectId) -> IncidentResult<IncidentResponse> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        self.response(&incident).await
    }

    /// Looks an incident up by its reference number. Numbers failing the
    /// checksum are rejected before the store is queried.
    pub async fn get_by_reference(
        &self,
        actor: &Actor,
        reference_number: &str,
    ) -> IncidentResult<IncidentResponse> {
        if !reference::validate(reference_number) {
            return Err(IncidentError::Validation(
                "INVALID_REFERENCE_NUMBER".to_string(),
            ));
        }
        let incident = self
            .store
            .find_incident_by_reference(&reference_number.to_ascii_uppercase())
            .await?
            .ok_or_else(|| IncidentError::NotFound("INCIDENT_NOT_FOUND".to_string()))?;
        ensure_visible(&incident, actor)?;
        self.response(&incident).await
    }

    pub async fn list(
        &self,
        actor: &Actor,
        params: IncidentQueryParams,
    ) -> IncidentResult<IncidentPageResponse> {
        let (query, page, page_size) = params.into_query()?;
        let scope = IncidentScope::of(actor);
        let (incidents, total) = self.store.find_incidents(&query, &scope).await?;

        Ok(IncidentPageResponse {
            items: incidents.iter().map(Incident::to_summary).collect(),
            total,
            page,
            page_size,
        })
    }

    pub async fn update_draft(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        request: IncidentUpdateRequest,
    ) -> IncidentResult<IncidentResponse> {
        let mut incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        ensure_editable_draft(&incident, actor)?;

        if let Some(location) = &request.location {
            incident.location = required_text(location, "LOCATION_REQUIRED")?;
        }
        if let Some(description) = &request.description {
            incident.description = required_text(description, "DESCRIPTION_REQUIRED")?;
        }
        if let Some(severity) = request.severity {
            incident.severity = validate_severity(severity)?;
        }
        if let Some(resident_id) = &request.resident_id {
            let resident_id = parse_id(resident_id, "INVALID_RESIDENT_ID")?;
            self.active_resident(&resident_id, &incident.home_id).await?;
            incident.resident_id = Some(resident_id);
        }
        if let Some(kind) = request.kind {
            incident.kind = kind;
        }
        if let Some(occurred_at) = request.occurred_at {
            incident.occurred_at = DateTime::from_chrono(occurred_at);
        }
        if request.actions_taken.is_some() {
            incident.actions_taken = optional_text(request.actions_taken);
        }
        if request.witness_names.is_some() {
            incident.witness_names = optional_text(request.witness_names);
        }
        if request.notified_parties.is_some() {
            incident.notified_parties = optional_text(request.notified_parties);
        }
        incident.updated_at = DateTime::now();

        self.store.update_incident(&incident).await?;
        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::IncidentUpdated,
                actor,
                AuditResource::Incident,
                &incident._id,
            )
            .detail(format!("{} draft edited", incident.reference_number)),
        )
        .await;

        self.response(&incident).await
    }

    pub async fn submit(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
    ) -> IncidentResult<IncidentResponse> {
        let mut incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        ensure_editable_draft(&incident, actor)?;

        let now = DateTime::now();
        let first_notice = incident.admin_notified_at.is_none();
        incident.status = IncidentStatus::Submitted;
        incident.updated_at = now;
        if first_notice {
            incident.admin_notified_at = Some(now);
        }

        self.store.update_incident(&incident).await?;
        info!(incident = %incident.reference_number, "incident submitted");

        if first_notice {
            self.notify_admins(&incident, actor).await;
        }
        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::IncidentSubmitted,
                actor,
                AuditResource::Incident,
                &incident._id,
            )
            .detail(format!("{} submitted", incident.reference_number)),
        )
        .await;

        self.response(&incident).await
    }

    /// Administrative status change. Any source status is accepted; closing
    /// requires notes.
    pub async fn change_status(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        request: IncidentStatusRequest,
    ) -> IncidentResult<IncidentResponse> {
        if let Err(error) = ensure_admin(actor) {
            audit::record(
                self.audit.as_ref(),
                AuditEvent::new(
                    AuditAction::IncidentStatusChanged,
                    actor,
                    AuditResource::Incident,
                    incident_id,
                )
                .outcome(AuditOutcome::Denied)
                .detail(format!("requested {}", request.status.label())),
            )
            .await;
            return Err(error);
        }
        let mut incident = find_visible(self.store.as_ref(), actor, incident_id).await?;

        let now = DateTime::now();
        let previous = incident.status;
        let mut first_notice = false;
        match request.status {
            IncidentStatus::Draft => {
                return Err(IncidentError::Validation(
                    "STATUS_NOT_ALLOWED".to_string(),
                ))
            }
            IncidentStatus::Closed => {
                let notes = request
                    .closure_notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|notes| !notes.is_empty())
                    .ok_or_else(|| {
                        IncidentError::Validation("CLOSURE_NOTES_REQUIRED".to_string())
                    })?;
                incident.closed_by_id = Some(actor.id);
                incident.closed_at = Some(now);
                incident.closure_notes = Some(notes.to_string());
            }
            IncidentStatus::Submitted => {
                if incident.admin_notified_at.is_none() {
                    incident.admin_notified_at = Some(now);
                    first_notice = true;
                }
            }
            IncidentStatus::UnderReview => (),
        }
        incident.status = request.status;
        incident.updated_at = now;

        self.store.update_incident(&incident).await?;
        info!(
            incident = %incident.reference_number,
            from = previous.label(),
            to = incident.status.label(),
            "incident status changed"
        );

        if first_notice {
            self.notify_admins(&incident, actor).await;
        }
        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::IncidentStatusChanged,
                actor,
                AuditResource::Incident,
                &incident._id,
            )
            .detail(format!("{} -> {}", previous.label(), incident.status.label())),
        )
        .await;

        self.response(&incident).await
    }

    /// Appends a follow-up note. Allowed in every status.
    pub async fn add_follow_up(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        request: IncidentFollowUpRequest,
    ) -> IncidentResult<IncidentFollowUpResponse> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        let note = required_text(&request.note, "NOTE_REQUIRED")?;

        let follow_up: IncidentFollowUp = IncidentFollowUp {
            _id: ObjectId::new(),
            incident_id: incident._id,
            author_id: actor.id,
            note,
            created_at: DateTime::now(),
        };
        self.store.insert_follow_up(&follow_up).await?;

        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::IncidentFollowUpAdded,
                actor,
                AuditResource::Incident,
                &incident._id,
            )
            .detail(format!("follow-up {} on {}", follow_up._id, incident.reference_number)),
        )
        .await;

        Ok(follow_up.to_response())
    }

    /// Hard-deletes a draft together with its follow-ups and photos.
    pub async fn delete_draft(&self, actor: &Actor, incident_id: &ObjectId) -> IncidentResult<()> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        ensure_editable_draft(&incident, actor)?;

        let photos = self.store.delete_incident(&incident._id).await?;
        self.attachments.purge(&photos).await;
        info!(incident = %incident.reference_number, photos = photos.len(), "draft incident deleted");

        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::IncidentDeleted,
                actor,
                AuditResource::Incident,
                &incident._id,
            )
            .detail(format!("{} deleted with {} photos", incident.reference_number, photos.len())),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::incident::IncidentKind;
    use crate::testing::{actor, admin, Fixture};

    #[tokio::test]
    async fn test_create_draft_assigns_reference_number() {
        let fixture = Fixture::new();

        let response = fixture
            .manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, false))
            .await
            .unwrap();

        assert_eq!(response.status, IncidentStatus::Draft);
        assert_eq!(response.reference_number, "FIR0100011");
        assert!(reference::validate(&response.reference_number));
        assert!(response.admin_notified_at.is_none());
        assert_eq!(fixture.notifier.count(), 0);
        assert_eq!(fixture.audit.events().len(), 1);
    }

    #[tokio::test]
    async fn test_sequence_and_home_rank_follow_snapshot() {
        let fixture = Fixture::new();
        let manager = &fixture.manager;

        manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, true))
            .await
            .unwrap();
        let second = manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, true))
            .await
            .unwrap();
        assert_eq!(&second.reference_number[..9], "FIR010002");

        let mut request = fixture.request(&fixture.second_home_id, false);
        request.kind = IncidentKind::Medication;
        let other = manager.create(&admin(), request).await.unwrap();
        assert_eq!(&other.reference_number[..9], "MIR020001");
    }

    #[tokio::test]
    async fn test_deleting_older_draft_does_not_reissue_live_number() {
        let fixture = Fixture::new();
        let manager = &fixture.manager;

        let draft = manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, false))
            .await
            .unwrap();
        let live = manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, true))
            .await
            .unwrap();
        let draft_id = ObjectId::parse_str(&draft._id).unwrap();
        manager.delete_draft(&fixture.reporter, &draft_id).await.unwrap();

        let next = manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, true))
            .await
            .unwrap();

        assert_ne!(next.reference_number, live.reference_number);
        assert_eq!(reference::sequence_of(&next.reference_number), Some(3));
        let found = manager
            .get_by_reference(&admin(), &live.reference_number)
            .await
            .unwrap();
        assert_eq!(found._id, live._id);
    }

    #[tokio::test]
    async fn test_create_submitted_notifies_once() {
        let fixture = Fixture::new();

        let response = fixture
            .manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, true))
            .await
            .unwrap();

        assert_eq!(response.status, IncidentStatus::Submitted);
        assert!(response.admin_notified_at.is_some());
        assert_eq!(fixture.notifier.count(), 1);
        assert_eq!(fixture.notifier.notices()[0].home_label, "Maple House");
        assert_eq!(fixture.notifier.notices()[0].subject_label, "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let fixture = Fixture::new();
        let manager = &fixture.manager;

        let mut request = fixture.request(&fixture.home_id, false);
        request.severity = 6;
        assert!(matches!(
            manager.create(&fixture.reporter, request).await,
            Err(IncidentError::Validation(_))
        ));

        let mut request = fixture.request(&fixture.home_id, false);
        request.severity = 0;
        assert!(matches!(
            manager.create(&fixture.reporter, request).await,
            Err(IncidentError::Validation(_))
        ));

        let mut request = fixture.request(&fixture.home_id, false);
        request.location = "   ".to_string();
        assert!(matches!(
            manager.create(&fixture.reporter, request).await,
            Err(IncidentError::Validation(_))
        ));

        let mut request = fixture.request(&fixture.home_id, false);
        request.resident_id = Some(fixture.inactive_resident_id.to_hex());
        assert!(matches!(
            manager.create(&fixture.reporter, request).await,
            Err(IncidentError::NotFound(_))
        ));

        let request = fixture.request(&fixture.inactive_home_id, false);
        assert!(matches!(
            manager.create(&admin(), request).await,
            Err(IncidentError::NotFound(_))
        ));

        let request = fixture.request(&fixture.second_home_id, false);
        assert!(matches!(
            manager.create(&fixture.reporter, request).await,
            Err(IncidentError::Authorization(_))
        ));

        assert_eq!(fixture.store.incident_count(), 0);
        assert!(fixture.audit.events().is_empty());
    }

    #[tokio::test]
    async fn test_home_level_incident() {
        let fixture = Fixture::new();
        let mut request = fixture.request(&fixture.home_id, true);
        request.resident_id = None;

        let response = fixture.manager.create(&fixture.reporter, request).await.unwrap();

        assert!(response.resident_id.is_none());
        assert_eq!(fixture.notifier.notices()[0].subject_label, "Home-level incident");
    }

    #[tokio::test]
    async fn test_draft_invisible_to_admin() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Draft).await;

        assert!(fixture.manager.get(&fixture.reporter, &incident._id).await.is_ok());
        assert!(matches!(
            fixture.manager.get(&admin(), &incident._id).await,
            Err(IncidentError::Authorization(_))
        ));

        let page = fixture
            .manager
            .list(&admin(), IncidentQueryParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        let page = fixture
            .manager
            .list(&fixture.reporter, IncidentQueryParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_list_respects_home_scope_and_filters() {
        let fixture = Fixture::new();
        fixture.incident(IncidentStatus::Submitted).await;
        fixture.incident(IncidentStatus::Closed).await;
        let mut request = fixture.request(&fixture.second_home_id, true);
        request.resident_id = None;
        fixture.manager.create(&admin(), request).await.unwrap();

        let outsider = actor(&[fixture.second_home_id]);
        let page = fixture
            .manager
            .list(&outsider, IncidentQueryParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);

        let page = fixture
            .manager
            .list(&admin(), IncidentQueryParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 3);

        let params = IncidentQueryParams {
            status: Some(IncidentStatus::Closed),
            ..Default::default()
        };
        let page = fixture.manager.list(&admin(), params).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status, IncidentStatus::Closed);

        let params = IncidentQueryParams {
            page: Some(2),
            page_size: Some(2),
            ..Default::default()
        };
        let page = fixture.manager.list(&admin(), params).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, 3);

        let params = IncidentQueryParams {
            page_size: Some(MAX_PAGE_SIZE + 1),
            ..Default::default()
        };
        assert!(matches!(
            fixture.manager.list(&admin(), params).await,
            Err(IncidentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_draft_keeps_reference_number() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Draft).await;

        let request = IncidentUpdateRequest {
            kind: Some(IncidentKind::Elopement),
            severity: Some(5),
            description: Some("Found at the side gate".to_string()),
            ..Default::default()
        };
        let response = fixture
            .manager
            .update_draft(&fixture.reporter, &incident._id, request)
            .await
            .unwrap();

        assert_eq!(response.reference_number, incident.reference_number);
        assert_eq!(response.kind, IncidentKind::Elopement);
        assert_eq!(response.severity, 5);
        assert_eq!(response.description, "Found at the side gate");
    }

    #[tokio::test]
    async fn test_non_draft_operations_conflict() {
        let fixture = Fixture::new();
        for status in [
            IncidentStatus::Submitted,
            IncidentStatus::UnderReview,
            IncidentStatus::Closed,
        ] {
            let incident = fixture.incident(status).await;
            let before = fixture.store.incident(&incident._id).unwrap();

            let request = IncidentUpdateRequest {
                severity: Some(1),
                ..Default::default()
            };
            assert!(matches!(
                fixture.manager.update_draft(&fixture.reporter, &incident._id, request).await,
                Err(IncidentError::StateConflict(_))
            ));
            assert!(matches!(
                fixture.manager.submit(&fixture.reporter, &incident._id).await,
                Err(IncidentError::StateConflict(_))
            ));
            assert!(matches!(
                fixture.manager.delete_draft(&fixture.reporter, &incident._id).await,
                Err(IncidentError::StateConflict(_))
            ));

            let after = fixture.store.incident(&incident._id).unwrap();
            assert_eq!(after.status, before.status);
            assert_eq!(after.severity, before.severity);
            assert_eq!(after.updated_at, before.updated_at);
        }
    }

    #[tokio::test]
    async fn test_submit_draft_notifies_exactly_once() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Draft).await;

        let response = fixture
            .manager
            .submit(&fixture.reporter, &incident._id)
            .await
            .unwrap();

        assert_eq!(response.status, IncidentStatus::Submitted);
        assert!(response.admin_notified_at.is_some());
        assert_eq!(fixture.notifier.count(), 1);

        let admin = admin();
        let request = IncidentStatusRequest {
            status: IncidentStatus::Submitted,
            closure_notes: None,
        };
        fixture
            .manager
            .change_status(&admin, &incident._id, request)
            .await
            .unwrap();
        assert_eq!(fixture.notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_close_requires_notes() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Submitted).await;
        let admin = admin();

        for notes in [None, Some("".to_string()), Some("   ".to_string())] {
            let request = IncidentStatusRequest {
                status: IncidentStatus::Closed,
                closure_notes: notes,
            };
            assert!(matches!(
                fixture.manager.change_status(&admin, &incident._id, request).await,
                Err(IncidentError::Validation(_))
            ));
        }
        assert_eq!(
            fixture.store.incident(&incident._id).unwrap().status,
            IncidentStatus::Submitted
        );

        let request = IncidentStatusRequest {
            status: IncidentStatus::Closed,
            closure_notes: Some("Fall mat installed".to_string()),
        };
        let response = fixture
            .manager
            .change_status(&admin, &incident._id, request)
            .await
            .unwrap();
        assert_eq!(response.status, IncidentStatus::Closed);
        assert_eq!(response.closed_by_id, Some(admin.id.to_hex()));
        assert!(response.closed_at.is_some());
        assert_eq!(response.closure_notes.as_deref(), Some("Fall mat installed"));
    }

    #[tokio::test]
    async fn test_status_changes_are_unrestricted_for_admins() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Closed).await;
        let request = IncidentStatusRequest {
            status: IncidentStatus::UnderReview,
            closure_notes: None,
        };

        let response = fixture
            .manager
            .change_status(&admin(), &incident._id, request)
            .await
            .unwrap();
        assert_eq!(response.status, IncidentStatus::UnderReview);

        let request = IncidentStatusRequest {
            status: IncidentStatus::Draft,
            closure_notes: None,
        };
        assert!(matches!(
            fixture.manager.change_status(&admin(), &incident._id, request).await,
            Err(IncidentError::Validation(_))
        ));

        let request = IncidentStatusRequest {
            status: IncidentStatus::UnderReview,
            closure_notes: None,
        };
        assert!(matches!(
            fixture.manager.change_status(&fixture.reporter, &incident._id, request).await,
            Err(IncidentError::Authorization(_))
        ));
        let last = fixture.audit.events().pop().unwrap();
        assert_eq!(last.outcome, AuditOutcome::Denied);
    }

    #[tokio::test]
    async fn test_follow_up_on_closed_incident() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Closed).await;
        let colleague = actor(&[fixture.home_id]);

        fixture
            .manager
            .add_follow_up(
                &colleague,
                &incident._id,
                IncidentFollowUpRequest {
                    note: "Family called back".to_string(),
                },
            )
            .await
            .unwrap();
        let result = fixture
            .manager
            .add_follow_up(
                &colleague,
                &incident._id,
                IncidentFollowUpRequest {
                    note: " ".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(IncidentError::Validation(_))));

        let response = fixture.manager.get(&colleague, &incident._id).await.unwrap();
        assert_eq!(response.follow_ups.len(), 1);
        assert_eq!(response.follow_ups[0].note, "Family called back");
    }

    #[tokio::test]
    async fn test_delete_draft_removes_photos_and_blobs() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Draft).await;
        let photo = fixture.upload_photo(&incident, "a.png").await;

        fixture
            .manager
            .delete_draft(&fixture.reporter, &incident._id)
            .await
            .unwrap();

        assert!(fixture.store.incident(&incident._id).is_none());
        assert!(fixture.store.photo(&photo._id).is_none());
        assert!(!fixture.blobs.contains(&photo.storage_path));
        let last = fixture.audit.events().pop().unwrap();
        assert_eq!(last.action, AuditAction::IncidentDeleted);
    }

    #[tokio::test]
    async fn test_get_by_reference() {
        let fixture = Fixture::new();
        let incident = fixture.incident(IncidentStatus::Submitted).await;
        let manager = &fixture.manager;

        let response = manager
            .get_by_reference(&admin(), &incident.reference_number.to_ascii_lowercase())
            .await
            .unwrap();
        assert_eq!(response._id, incident._id.to_hex());

        let mut tampered = incident.reference_number.clone();
        tampered.pop();
        tampered.push(if incident.reference_number.ends_with('0') { '1' } else { '0' });
        assert!(matches!(
            manager.get_by_reference(&admin(), &tampered).await,
            Err(IncidentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_operation() {
        let fixture = Fixture::new();
        fixture.audit.fail(true);

        let response = fixture
            .manager
            .create(&fixture.reporter, fixture.request(&fixture.home_id, false))
            .await;

        assert!(response.is_ok());
        assert_eq!(fixture.store.incident_count(), 1);
    }
}
