//! In-memory doubles for the store, blob and side-effect seams.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use crate::{
    error::{IncidentError, IncidentResult},
    incident::{access::IncidentScope, lifecycle::IncidentLifecycleManager, reference},
    models::{
        actor::Actor,
        home::Home,
        incident::{
            Incident, IncidentFollowUp, IncidentKind, IncidentQuery, IncidentRequest,
            IncidentStatus,
        },
        photo::{resequence, Photo, PhotoStatus, PhotoUploadRequest},
        resident::Resident,
    },
    services::{
        audit::{AuditError, AuditEvent, AuditLog},
        blob::{BlobCredential, BlobError, BlobStore},
        notification::{NewIncidentNotice, NotificationError, Notifier},
    },
    store::IncidentStore,
};

pub fn actor(home_ids: &[ObjectId]) -> Actor {
    Actor {
        id: ObjectId::new(),
        name: "Casey Caregiver".to_string(),
        is_admin: false,
        home_ids: Some(home_ids.to_vec()),
        source_address: Some("127.0.0.1".to_string()),
    }
}

pub fn admin() -> Actor {
    Actor {
        id: ObjectId::new(),
        name: "Avery Admin".to_string(),
        is_admin: true,
        home_ids: None,
        source_address: Some("127.0.0.1".to_string()),
    }
}

pub fn incident_at(home_id: ObjectId, reporter: &Actor, status: IncidentStatus) -> Incident {
    let now = DateTime::now();
    Incident {
        _id: ObjectId::new(),
        reference_number: reference::generate(IncidentKind::Fall, 1, 1).unwrap(),
        resident_id: None,
        home_id,
        reported_by_id: reporter.id,
        kind: IncidentKind::Fall,
        severity: 3,
        occurred_at: now,
        location: "Lounge".to_string(),
        description: "Slipped beside the armchair".to_string(),
        actions_taken: None,
        witness_names: None,
        notified_parties: None,
        status,
        closed_by_id: None,
        closed_at: None,
        closure_notes: None,
        admin_notified_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn photo_request(file_name: &str, content_type: &str) -> PhotoUploadRequest {
    PhotoUploadRequest {
        file_name: file_name.to_string(),
        content_type: content_type.to_string(),
        size_bytes: 2048,
        caption: None,
    }
}

#[derive(Default)]
pub struct MemoryIncidentStore {
    homes: Mutex<Vec<Home>>,
    residents: Mutex<Vec<Resident>>,
    incidents: Mutex<Vec<Incident>>,
    follow_ups: Mutex<Vec<IncidentFollowUp>>,
    photos: Mutex<Vec<Photo>>,
}

impl MemoryIncidentStore {
    pub fn add_home(&self, home: Home) {
        self.homes.lock().unwrap().push(home);
    }
    pub fn add_resident(&self, resident: Resident) {
        self.residents.lock().unwrap().push(resident);
    }
    pub fn put_incident(&self, incident: Incident) {
        let mut incidents = self.incidents.lock().unwrap();
        incidents.retain(|stored| stored._id != incident._id);
        incidents.push(incident);
    }
    pub fn incident(&self, incident_id: &ObjectId) -> Option<Incident> {
        let incidents = self.incidents.lock().unwrap();
        incidents.iter().find(|incident| &incident._id == incident_id).cloned()
    }
    pub fn incident_count(&self) -> usize {
        self.incidents.lock().unwrap().len()
    }
    pub fn photo(&self, photo_id: &ObjectId) -> Option<Photo> {
        let photos = self.photos.lock().unwrap();
        photos.iter().find(|photo| &photo._id == photo_id).cloned()
    }
    pub fn photo_count(&self) -> usize {
        self.photos.lock().unwrap().len()
    }
}

fn matches_query(incident: &Incident, query: &IncidentQuery) -> bool {
    query.home_id.map_or(true, |id| incident.home_id == id)
        && query.resident_id.map_or(true, |id| incident.resident_id == Some(id))
        && query.status.map_or(true, |status| incident.status == status)
        && query.kind.map_or(true, |kind| incident.kind == kind)
        && query.occurred_from.map_or(true, |from| incident.occurred_at >= from)
        && query.occurred_to.map_or(true, |to| incident.occurred_at < to)
}

#[async_trait]
impl IncidentStore for MemoryIncidentStore {
    async fn find_home(&self, home_id: &ObjectId) -> IncidentResult<Option<Home>> {
        let homes = self.homes.lock().unwrap();
        Ok(homes.iter().find(|home| &home._id == home_id).cloned())
    }

    async fn find_homes(&self) -> IncidentResult<Vec<Home>> {
        Ok(self.homes.lock().unwrap().clone())
    }

    async fn find_resident(&self, resident_id: &ObjectId) -> IncidentResult<Option<Resident>> {
        let residents = self.residents.lock().unwrap();
        Ok(residents.iter().find(|resident| &resident._id == resident_id).cloned())
    }

    async fn count_incidents_by_home(&self, home_id: &ObjectId) -> IncidentResult<u64> {
        let incidents = self.incidents.lock().unwrap();
        Ok(incidents.iter().filter(|incident| &incident.home_id == home_id).count() as u64)
    }

    async fn find_latest_reference_by_home(
        &self,
        home_id: &ObjectId,
    ) -> IncidentResult<Option<String>> {
        let incidents = self.incidents.lock().unwrap();
        Ok(incidents
            .iter()
            .filter(|incident| &incident.home_id == home_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a._id.cmp(&b._id)))
            .map(|incident| incident.reference_number.clone()))
    }

    async fn insert_incident(&self, incident: &Incident) -> IncidentResult<()> {
        self.incidents.lock().unwrap().push(incident.clone());
        Ok(())
    }

    async fn find_incident(&self, incident_id: &ObjectId) -> IncidentResult<Option<Incident>> {
        Ok(self.incident(incident_id))
    }

    async fn find_incident_by_reference(
        &self,
        reference_number: &str,
    ) -> IncidentResult<Option<Incident>> {
        let incidents = self.incidents.lock().unwrap();
        Ok(incidents
            .iter()
            .find(|incident| incident.reference_number == reference_number)
            .cloned())
    }

    async fn find_incidents(
        &self,
        query: &IncidentQuery,
        scope: &IncidentScope,
    ) -> IncidentResult<(Vec<Incident>, u64)> {
        let mut matching: Vec<Incident> = self
            .incidents
            .lock()
            .unwrap()
            .iter()
            .filter(|incident| matches_query(incident, query) && scope.admits(incident))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then(b.created_at.cmp(&a.created_at))
        });

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn update_incident(&self, incident: &Incident) -> IncidentResult<()> {
        let mut incidents = self.incidents.lock().unwrap();
        match incidents.iter_mut().find(|stored| stored._id == incident._id) {
            Some(stored) => {
                *stored = incident.clone();
                Ok(())
            }
            None => Err(IncidentError::NotFound("INCIDENT_NOT_FOUND".to_string())),
        }
    }

    async fn delete_incident(&self, incident_id: &ObjectId) -> IncidentResult<Vec<Photo>> {
        let mut incidents = self.incidents.lock().unwrap();
        let before = incidents.len();
        incidents.retain(|incident| &incident._id != incident_id);
        if incidents.len() == before {
            return Err(IncidentError::NotFound("INCIDENT_NOT_FOUND".to_string()));
        }

        self.follow_ups
            .lock()
            .unwrap()
            .retain(|follow_up| &follow_up.incident_id != incident_id);
        let mut photos = self.photos.lock().unwrap();
        let (removed, kept): (Vec<Photo>, Vec<Photo>) = photos
            .drain(..)
            .partition(|photo| &photo.incident_id == incident_id);
        *photos = kept;
        Ok(removed)
    }

    async fn insert_follow_up(&self, follow_up: &IncidentFollowUp) -> IncidentResult<()> {
        self.follow_ups.lock().unwrap().push(follow_up.clone());
        Ok(())
    }

    async fn find_follow_ups(&self, incident_id: &ObjectId) -> IncidentResult<Vec<IncidentFollowUp>> {
        let follow_ups = self.follow_ups.lock().unwrap();
        Ok(follow_ups
            .iter()
            .filter(|follow_up| &follow_up.incident_id == incident_id)
            .cloned()
            .collect())
    }

    async fn count_photos(&self, incident_id: &ObjectId) -> IncidentResult<u64> {
        let photos = self.photos.lock().unwrap();
        Ok(photos.iter().filter(|photo| &photo.incident_id == incident_id).count() as u64)
    }

    async fn insert_photo(&self, photo: &Photo) -> IncidentResult<()> {
        self.photos.lock().unwrap().push(photo.clone());
        Ok(())
    }

    async fn find_photo(&self, photo_id: &ObjectId) -> IncidentResult<Option<Photo>> {
        Ok(self.photo(photo_id))
    }

    async fn find_photos(&self, incident_id: &ObjectId) -> IncidentResult<Vec<Photo>> {
        let mut photos: Vec<Photo> = self
            .photos
            .lock()
            .unwrap()
            .iter()
            .filter(|photo| &photo.incident_id == incident_id)
            .cloned()
            .collect();
        photos.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(photos)
    }

    async fn confirm_photo(&self, photo_id: &ObjectId) -> IncidentResult<()> {
        let mut photos = self.photos.lock().unwrap();
        match photos
            .iter_mut()
            .find(|photo| &photo._id == photo_id && photo.is_pending())
        {
            Some(photo) => {
                photo.status = PhotoStatus::Confirmed;
                Ok(())
            }
            None => Err(IncidentError::StateConflict("PHOTO_NOT_PENDING".to_string())),
        }
    }

    async fn delete_photo(&self, photo: &Photo) -> IncidentResult<()> {
        let mut photos = self.photos.lock().unwrap();
        let before = photos.len();
        photos.retain(|stored| stored._id != photo._id);
        if photos.len() == before {
            return Err(IncidentError::NotFound("PHOTO_NOT_FOUND".to_string()));
        }

        let mut remaining: Vec<Photo> = photos
            .iter()
            .filter(|stored| stored.incident_id == photo.incident_id)
            .cloned()
            .collect();
        for (photo_id, display_order) in resequence(&mut remaining) {
            if let Some(stored) = photos.iter_mut().find(|stored| stored._id == photo_id) {
                stored.display_order = display_order;
            }
        }
        Ok(())
    }
}

/// Blob store keyed by path; credentials are plain URLs.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Stands in for the client's direct upload.
    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }
    pub fn contains(&self, path: &str) -> bool {
        self.objects.lock().unwrap().contains_key(path)
    }
}

fn memory_credential(container: &str, path: &str, access: &str, ttl_minutes: i64) -> BlobCredential {
    BlobCredential {
        url: format!("memory://{}/{}?access={}", container, path, access),
        expires_at: Utc::now() + Duration::minutes(ttl_minutes),
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn issue_upload_credential(
        &self,
        path: &str,
        _content_type: &str,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<BlobCredential, BlobError> {
        Ok(memory_credential(container, path, "write", ttl_minutes))
    }

    async fn size(&self, path: &str, _container: &str) -> Result<Option<u64>, BlobError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects.get(path).map(|bytes| bytes.len() as u64))
    }

    async fn issue_read_credential(
        &self,
        path: &str,
        ttl_minutes: i64,
        container: &str,
    ) -> Result<BlobCredential, BlobError> {
        Ok(memory_credential(container, path, "read", ttl_minutes))
    }

    async fn delete(&self, path: &str, _container: &str) -> Result<(), BlobError> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn download(&self, path: &str, container: &str) -> Result<Vec<u8>, BlobError> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(format!("{}/{}", container, path)))
    }
}

#[derive(Default)]
pub struct RecordingAuditLog {
    events: Mutex<Vec<AuditEvent>>,
    failing: AtomicBool,
}

impl RecordingAuditLog {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditLog for RecordingAuditLog {
    async fn record_event(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError("sink offline".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<NewIncidentNotice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<NewIncidentNotice> {
        self.notices.lock().unwrap().clone()
    }
    pub fn count(&self) -> usize {
        self.notices.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admins_of_new_incident(
        &self,
        notice: &NewIncidentNotice,
    ) -> Result<(), NotificationError> {
        self.notices.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// A manager wired to fresh doubles, with three homes and two residents.
///
/// Homes rank in the order `home_id`, `second_home_id`, `inactive_home_id`.
/// The reporter is scoped to `home_id`, where `resident_id` lives.
pub struct Fixture {
    pub manager: IncidentLifecycleManager,
    pub store: Arc<MemoryIncidentStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub audit: Arc<RecordingAuditLog>,
    pub notifier: Arc<RecordingNotifier>,
    pub reporter: Actor,
    pub home_id: ObjectId,
    pub second_home_id: ObjectId,
    pub inactive_home_id: ObjectId,
    pub resident_id: ObjectId,
    pub inactive_resident_id: ObjectId,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryIncidentStore::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let audit = Arc::new(RecordingAuditLog::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let home = |name: &str, is_active: bool, created_millis: i64| Home {
            _id: ObjectId::new(),
            name: name.to_string(),
            is_active,
            created_at: DateTime::from_millis(created_millis),
        };
        let maple = home("Maple House", true, 1_000);
        let birch = home("Birch Court", true, 2_000);
        let closed = home("Old Rectory", false, 3_000);
        let (home_id, second_home_id, inactive_home_id) = (maple._id, birch._id, closed._id);
        store.add_home(closed);
        store.add_home(birch);
        store.add_home(maple);

        let resident = |first_name: &str, last_name: &str, is_active: bool| Resident {
            _id: ObjectId::new(),
            home_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            is_active,
        };
        let ada = resident("Ada", "Lovelace", true);
        let former = resident("Grace", "Hopper", false);
        let (resident_id, inactive_resident_id) = (ada._id, former._id);
        store.add_resident(ada);
        store.add_resident(former);

        let manager = IncidentLifecycleManager::new(
            store.clone(),
            blobs.clone(),
            audit.clone(),
            notifier.clone(),
        );

        Fixture {
            manager,
            store,
            blobs,
            audit,
            notifier,
            reporter: actor(&[home_id]),
            home_id,
            second_home_id,
            inactive_home_id,
            resident_id,
            inactive_resident_id,
        }
    }

    /// A valid creation request. The active resident is attached when the
    /// home is `home_id`.
    pub fn request(&self, home_id: &ObjectId, submit: bool) -> IncidentRequest {
        IncidentRequest {
            resident_id: if home_id == &self.home_id {
                Some(self.resident_id.to_hex())
            } else {
                None
            },
            home_id: home_id.to_hex(),
            kind: IncidentKind::Fall,
            severity: 3,
            occurred_at: Utc::now() - Duration::hours(1),
            location: "Dining room".to_string(),
            description: "Resident slid from chair during lunch".to_string(),
            actions_taken: Some("Checked for injuries, helped back to chair".to_string()),
            witness_names: None,
            notified_parties: None,
            submit,
        }
    }

    /// Creates an incident through the manager as the reporter, then forces
    /// the requested status directly in the store.
    pub async fn incident(&self, status: IncidentStatus) -> Incident {
        let request = self.request(&self.home_id, status != IncidentStatus::Draft);
        let response = self.manager.create(&self.reporter, request).await.unwrap();
        let incident_id = ObjectId::parse_str(&response._id).unwrap();

        let mut incident = self.store.incident(&incident_id).unwrap();
        if matches!(status, IncidentStatus::UnderReview | IncidentStatus::Closed) {
            incident.status = status;
        }
        if status == IncidentStatus::Closed {
            incident.closed_by_id = Some(ObjectId::new());
            incident.closed_at = Some(DateTime::now());
            incident.closure_notes = Some("Reviewed with family".to_string());
        }
        self.store.put_incident(incident.clone());
        incident
    }

    /// Runs the full two-phase upload as the reporter.
    pub async fn upload_photo(&self, incident: &Incident, file_name: &str) -> Photo {
        let coordinator = self.manager.attachments();
        let response = coordinator
            .initiate(&self.reporter, &incident._id, photo_request(file_name, "image/png"))
            .await
            .unwrap();
        let photo_id = ObjectId::parse_str(&response.photo_id).unwrap();
        let pending = self.store.photo(&photo_id).unwrap();

        self.blobs
            .put(&pending.storage_path, &vec![0x89; pending.size_bytes as usize]);
        coordinator
            .confirm(&self.reporter, &incident._id, &photo_id)
            .await
            .unwrap();
        self.store.photo(&photo_id).unwrap()
    }
}
