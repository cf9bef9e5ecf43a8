//! Persistence seam for the incident engine.
//!
//! Every method is a single atomic unit against the primary store. Methods that
//! touch several documents (`delete_incident`, `delete_photo`) run inside one
//! transaction.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use crate::{
    error::IncidentResult,
    incident::access::IncidentScope,
    models::{
        home::Home,
        incident::{Incident, IncidentFollowUp, IncidentQuery},
        photo::Photo,
        resident::Resident,
    },
};

pub mod mongo;

pub const HOME_COLLECTION: &str = "homes";
pub const RESIDENT_COLLECTION: &str = "residents";
pub const INCIDENT_COLLECTION: &str = "incidents";
pub const FOLLOW_UP_COLLECTION: &str = "incident-follow-ups";
pub const PHOTO_COLLECTION: &str = "incident-photos";

#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn find_home(&self, home_id: &ObjectId) -> IncidentResult<Option<Home>>;

    /// All homes, active or not, in no particular order.
    async fn find_homes(&self) -> IncidentResult<Vec<Home>>;

    async fn find_resident(&self, resident_id: &ObjectId) -> IncidentResult<Option<Resident>>;

    async fn count_incidents_by_home(&self, home_id: &ObjectId) -> IncidentResult<u64>;

    /// Reference number of the home's most recently created incident.
    async fn find_latest_reference_by_home(
        &self,
        home_id: &ObjectId,
    ) -> IncidentResult<Option<String>>;

    async fn insert_incident(&self, incident: &Incident) -> IncidentResult<()>;

    async fn find_incident(&self, incident_id: &ObjectId) -> IncidentResult<Option<Incident>>;

    async fn find_incident_by_reference(
        &self,
        reference_number: &str,
    ) -> IncidentResult<Option<Incident>>;

    /// One page of incidents matching `query` that `scope` admits, newest
    /// occurrence first, with the total number of matches.
    async fn find_incidents(
        &self,
        query: &IncidentQuery,
        scope: &IncidentScope,
    ) -> IncidentResult<(Vec<Incident>, u64)>;

    async fn update_incident(&self, incident: &Incident) -> IncidentResult<()>;

    /// Removes the incident with its follow-ups and photo records. Returns the
    /// removed photos so their blobs can be cleaned up.
    async fn delete_incident(&self, incident_id: &ObjectId) -> IncidentResult<Vec<Photo>>;

    async fn insert_follow_up(&self, follow_up: &IncidentFollowUp) -> IncidentResult<()>;

    /// Follow-ups of an incident, oldest first.
    async fn find_follow_ups(&self, incident_id: &ObjectId) -> IncidentResult<Vec<IncidentFollowUp>>;

    async fn count_photos(&self, incident_id: &ObjectId) -> IncidentResult<u64>;

    async fn insert_photo(&self, photo: &Photo) -> IncidentResult<()>;

    async fn find_photo(&self, photo_id: &ObjectId) -> IncidentResult<Option<Photo>>;

    /// All photo records of an incident, pending included, by display order.
    async fn find_photos(&self, incident_id: &ObjectId) -> IncidentResult<Vec<Photo>>;

    /// Marks a pending photo as confirmed.
    async fn confirm_photo(&self, photo_id: &ObjectId) -> IncidentResult<()>;

    /// Removes a photo record and renumbers the incident's remaining photos so
    /// their display orders stay contiguous.
    async fn delete_photo(&self, photo: &Photo) -> IncidentResult<()>;
}
