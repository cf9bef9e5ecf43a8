//! Who may see and who may change an incident.
//!
//! A draft is visible to its reporter only. Administrators do not bypass this;
//! it is the single place where an admin lacks universal read access. Beyond
//! drafts, home-scoped actors see incidents of their own homes only.

use mongodb::bson::oid::ObjectId;

use crate::{
    error::{IncidentError, IncidentResult},
    models::{actor::Actor, incident::Incident, photo::Photo},
    store::IncidentStore,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    HiddenDraft,
    OutOfScope,
}

/// The visibility rule in a form the store can apply to a query.
#[derive(Clone, Debug)]
pub struct IncidentScope {
    pub viewer_id: ObjectId,
    pub home_ids: Option<Vec<ObjectId>>,
}

pub fn visibility(incident: &Incident, actor: &Actor) -> Visibility {
    if incident.is_draft() && !incident.is_reported_by(&actor.id) {
        return Visibility::HiddenDraft;
    }
    if !actor.can_access_home(&incident.home_id) {
        return Visibility::OutOfScope;
    }
    Visibility::Visible
}

pub fn ensure_visible(incident: &Incident, actor: &Actor) -> IncidentResult<()> {
    match visibility(incident, actor) {
        Visibility::Visible => Ok(()),
        Visibility::HiddenDraft | Visibility::OutOfScope => Err(IncidentError::Authorization(
            "INCIDENT_NOT_VISIBLE".to_string(),
        )),
    }
}

/// Loads an incident and applies the visibility rule.
pub async fn find_visible(
    store: &dyn IncidentStore,
    actor: &Actor,
    incident_id: &ObjectId,
) -> IncidentResult<Incident> {
    let incident = store
        .find_incident(incident_id)
        .await?
        .ok_or_else(|| IncidentError::NotFound("INCIDENT_NOT_FOUND".to_string()))?;
    ensure_visible(&incident, actor)?;
    Ok(incident)
}

/// Field edits, submission and deletion belong to the reporter of a draft.
/// Anything else is a lifecycle conflict.
pub fn ensure_editable_draft(incident: &Incident, actor: &Actor) -> IncidentResult<()> {
    if !incident.is_draft() || !incident.is_reported_by(&actor.id) {
        return Err(IncidentError::StateConflict(
            "INCIDENT_NOT_EDITABLE".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_admin(actor: &Actor) -> IncidentResult<()> {
    if !actor.is_admin {
        return Err(IncidentError::Authorization("ADMIN_REQUIRED".to_string()));
    }
    Ok(())
}

/// Attaching photos is open to the reporter and to administrators.
pub fn ensure_can_attach(incident: &Incident, actor: &Actor) -> IncidentResult<()> {
    if actor.is_admin || incident.is_reported_by(&actor.id) {
        return Ok(());
    }
    Err(IncidentError::Authorization(
        "PHOTO_ATTACH_NOT_PERMITTED".to_string(),
    ))
}

/// Administrators may remove any photo. The uploader or the reporter may remove
/// one while the incident is still a draft.
pub fn ensure_can_delete_photo(
    incident: &Incident,
    photo: &Photo,
    actor: &Actor,
) -> IncidentResult<()> {
    if actor.is_admin {
        return Ok(());
    }
    if photo.uploaded_by_id != actor.id && !incident.is_reported_by(&actor.id) {
        return Err(IncidentError::Authorization(
            "PHOTO_DELETE_NOT_PERMITTED".to_string(),
        ));
    }
    if !incident.is_draft() {
        return Err(IncidentError::StateConflict(
            "INCIDENT_NOT_EDITABLE".to_string(),
        ));
    }
    Ok(())
}

impl IncidentScope {
    pub fn of(actor: &Actor) -> Self {
        IncidentScope {
            viewer_id: actor.id,
            home_ids: actor.home_ids.clone(),
        }
    }
    /// In-process form of the filter `MongoIncidentStore` builds for listing.
    #[cfg(test)]
    pub fn admits(&self, incident: &Incident) -> bool {
        if incident.is_draft() && !incident.is_reported_by(&self.viewer_id) {
            return false;
        }
        match &self.home_ids {
            Some(home_ids) => home_ids.contains(&incident.home_id),
            None => true,
        }
    }
}
