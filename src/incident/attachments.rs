//! Two-phase photo uploads.
//!
//! `initiate` writes a pending photo record and hands back a short-lived
//! upload credential. The client sends the bytes straight to the blob store
//! and then calls `confirm`, which checks that the object really exists with
//! the declared size. A record whose object never arrived, or arrived with a
//! different size, is removed at that point, so metadata never outlives a
//! failed transfer once confirm has run.
//!
//! Records whose uploader never calls confirm or cancel stay pending; nothing
//! sweeps them.

use mongodb::bson::{oid::ObjectId, DateTime};
use std::sync::Arc;
use tracing::{info, warn};

use super::access::{ensure_can_attach, ensure_can_delete_photo, find_visible};
use crate::{
    error::{IncidentError, IncidentResult},
    models::{
        actor::Actor,
        incident::Incident,
        photo::{
            photo_extension, Photo, PhotoResponse, PhotoStatus, PhotoUploadRequest,
            PhotoUploadResponse, PhotoViewResponse, PHOTO_MAX_BYTES,
        },
    },
    services::{
        audit::{self, AuditAction, AuditEvent, AuditLog, AuditOutcome, AuditResource},
        blob::BlobStore,
    },
    store::IncidentStore,
};

pub const PHOTO_CONTAINER: &str = "incident-photos";
pub const UPLOAD_TTL_MINUTES: i64 = 10;
pub const VIEW_TTL_MINUTES: i64 = 15;

pub struct AttachmentCoordinator {
    store: Arc<dyn IncidentStore>,
    blobs: Arc<dyn BlobStore>,
    audit: Arc<dyn AuditLog>,
}

fn validate_upload(request: &PhotoUploadRequest) -> IncidentResult<&'static str> {
    if request.file_name.trim().is_empty() {
        return Err(IncidentError::Validation("PHOTO_FILE_NAME_REQUIRED".to_string()));
    }
    let extension = photo_extension(&request.content_type).ok_or_else(|| {
        IncidentError::Validation("PHOTO_CONTENT_TYPE_NOT_ALLOWED".to_string())
    })?;
    if request.size_bytes <= 0 || request.size_bytes > PHOTO_MAX_BYTES {
        return Err(IncidentError::Validation("PHOTO_SIZE_OUT_OF_RANGE".to_string()));
    }
    Ok(extension)
}

pub fn storage_path(incident: &Incident, photo_id: &ObjectId, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        incident.home_id.to_hex(),
        incident._id.to_hex(),
        photo_id.to_hex(),
        extension
    )
}

impl AttachmentCoordinator {
    pub fn new(
        store: Arc<dyn IncidentStore>,
        blobs: Arc<dyn BlobStore>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        AttachmentCoordinator {
            store,
            blobs,
            audit,
        }
    }

    async fn find_photo_of(&self, incident: &Incident, photo_id: &ObjectId) -> IncidentResult<Photo> {
        match self.store.find_photo(photo_id).await? {
            Some(photo) if photo.incident_id == incident._id => Ok(photo),
            _ => Err(IncidentError::NotFound("PHOTO_NOT_FOUND".to_string())),
        }
    }

    pub async fn initiate(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        request: PhotoUploadRequest,
    ) -> IncidentResult<PhotoUploadResponse> {
        let extension = validate_upload(&request)?;
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        ensure_can_attach(&incident, actor)?;

        let display_order = self.store.count_photos(&incident._id).await? as i32;
        let photo_id = ObjectId::new();
        let photo: Photo = Photo {
            _id: photo_id,
            incident_id: incident._id,
            storage_path: storage_path(&incident, &photo_id, extension),
            file_name: request.file_name.trim().to_string(),
            content_type: request.content_type.to_ascii_lowercase(),
            size_bytes: request.size_bytes,
            display_order,
            caption: request
                .caption
                .map(|caption| caption.trim().to_string())
                .filter(|caption| !caption.is_empty()),
            uploaded_by_id: actor.id,
            status: PhotoStatus::Pending,
            created_at: DateTime::now(),
        };
        self.store.insert_photo(&photo).await?;

        let credential = match self
            .blobs
            .issue_upload_credential(
                &photo.storage_path,
                &photo.content_type,
                UPLOAD_TTL_MINUTES,
                PHOTO_CONTAINER,
            )
            .await
        {
            Ok(credential) => credential,
            Err(error) => {
                warn!(photo_id = %photo._id, "upload credential not issued: {}", error);
                self.store.delete_photo(&photo).await?;
                return Err(error.into());
            }
        };

        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::PhotoUploadStarted,
                actor,
                AuditResource::IncidentPhoto,
                &photo._id,
            )
            .detail(format!("incident {} slot {}", incident.reference_number, display_order)),
        )
        .await;

        Ok(PhotoUploadResponse {
            photo_id: photo._id.to_hex(),
            upload_url: credential.url,
            expires_at: credential.expires_at,
        })
    }

    pub async fn confirm(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        photo_id: &ObjectId,
    ) -> IncidentResult<PhotoResponse> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        let mut photo = self.find_photo_of(&incident, photo_id).await?;
        if photo.uploaded_by_id != actor.id {
            return Err(IncidentError::Authorization(
                "PHOTO_CONFIRM_NOT_PERMITTED".to_string(),
            ));
        }
        if !photo.is_pending() {
            return Ok(photo.to_response());
        }

        let stored_size = self
            .blobs
            .size(&photo.storage_path, PHOTO_CONTAINER)
            .await?;
        let failure = match stored_size {
            None => Some(("uploaded object missing", "PHOTO_UPLOAD_MISSING_RETRY")),
            Some(size) if size != photo.size_bytes as u64 => {
                Some(("uploaded object size differs", "PHOTO_UPLOAD_SIZE_MISMATCH"))
            }
            Some(_) => None,
        };
        if let Some((detail, code)) = failure {
            self.store.delete_photo(&photo).await?;
            if stored_size.is_some() {
                self.purge(std::slice::from_ref(&photo)).await;
            }
            audit::record(
                self.audit.as_ref(),
                AuditEvent::new(
                    AuditAction::PhotoUploadConfirmed,
                    actor,
                    AuditResource::IncidentPhoto,
                    &photo._id,
                )
                .outcome(AuditOutcome::Failure)
                .detail(format!("{}, pending record removed", detail)),
            )
            .await;
            return Err(IncidentError::Validation(code.to_string()));
        }

        self.store.confirm_photo(&photo._id).await?;
        photo.status = PhotoStatus::Confirmed;
        info!(photo_id = %photo._id, incident = %incident.reference_number, "photo confirmed");

        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::PhotoUploadConfirmed,
                actor,
                AuditResource::IncidentPhoto,
                &photo._id,
            )
            .detail(format!("{} ({} bytes)", photo.file_name, photo.size_bytes)),
        )
        .await;

        Ok(photo.to_response())
    }

    /// Rollback for a client whose transfer failed before confirm.
    pub async fn cancel(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        photo_id: &ObjectId,
    ) -> IncidentResult<()> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        let photo = self.find_photo_of(&incident, photo_id).await?;
        if photo.uploaded_by_id != actor.id {
            return Err(IncidentError::Authorization(
                "PHOTO_CANCEL_NOT_PERMITTED".to_string(),
            ));
        }
        if !photo.is_pending() {
            return Err(IncidentError::StateConflict(
                "PHOTO_ALREADY_CONFIRMED".to_string(),
            ));
        }

        self.store.delete_photo(&photo).await?;

        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::PhotoUploadCancelled,
                actor,
                AuditResource::IncidentPhoto,
                &photo._id,
            ),
        )
        .await;
        Ok(())
    }

    /// Confirmed photos of an incident in display order.
    pub async fn list(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
    ) -> IncidentResult<Vec<PhotoResponse>> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        self.confirmed_photos(&incident._id).await
    }

    pub(crate) async fn confirmed_photos(
        &self,
        incident_id: &ObjectId,
    ) -> IncidentResult<Vec<PhotoResponse>> {
        let photos = self.store.find_photos(incident_id).await?;
        Ok(photos
            .iter()
            .filter(|photo| !photo.is_pending())
            .map(Photo::to_response)
            .collect())
    }

    pub async fn view_url(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        photo_id: &ObjectId,
    ) -> IncidentResult<PhotoViewResponse> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        let photo = self.find_photo_of(&incident, photo_id).await?;
        if photo.is_pending() {
            return Err(IncidentError::NotFound("PHOTO_NOT_FOUND".to_string()));
        }

        let credential = self
            .blobs
            .issue_read_credential(&photo.storage_path, VIEW_TTL_MINUTES, PHOTO_CONTAINER)
            .await?;

        Ok(PhotoViewResponse {
            photo_id: photo._id.to_hex(),
            url: credential.url,
            expires_at: credential.expires_at,
        })
    }

    pub async fn delete(
        &self,
        actor: &Actor,
        incident_id: &ObjectId,
        photo_id: &ObjectId,
    ) -> IncidentResult<()> {
        let incident = find_visible(self.store.as_ref(), actor, incident_id).await?;
        let photo = self.find_photo_of(&incident, photo_id).await?;
        ensure_can_delete_photo(&incident, &photo, actor)?;

        self.store.delete_photo(&photo).await?;
        self.purge(std::slice::from_ref(&photo)).await;

        audit::record(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::PhotoDeleted,
                actor,
                AuditResource::IncidentPhoto,
                &photo._id,
            )
            .detail(format!("{} from {}", photo.file_name, incident.reference_number)),
        )
        .await;
        Ok(())
    }

    /// Best-effort removal of stored objects whose records are already gone.
    pub async fn purge(&self, photos: &[Photo]) {
        for photo in photos.iter() {
            if let Err(error) = self.blobs.delete(&photo.storage_path, PHOTO_CONTAINER).await {
                warn!(photo_id = %photo._id, path = %photo.storage_path, "blob not removed: {}", error);
            }
        }
    }
}
