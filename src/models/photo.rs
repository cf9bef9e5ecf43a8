use chrono::Utc;
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

pub const PHOTO_MAX_BYTES: i64 = 10 * 1024 * 1024;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhotoStatus {
    Pending,
    Confirmed,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Photo {
    pub _id: ObjectId,
    pub incident_id: ObjectId,
    pub storage_path: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub display_order: i32,
    pub caption: Option<String>,
    pub uploaded_by_id: ObjectId,
    pub status: PhotoStatus,
    pub created_at: DateTime,
}
#[derive(Debug, Deserialize)]
pub struct PhotoUploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub caption: Option<String>,
}
#[derive(Debug, Serialize)]
pub struct PhotoUploadResponse {
    pub photo_id: String,
    pub upload_url: String,
    pub expires_at: chrono::DateTime<Utc>,
}
#[derive(Debug, Serialize)]
pub struct PhotoViewResponse {
    pub photo_id: String,
    pub url: String,
    pub expires_at: chrono::DateTime<Utc>,
}
#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub _id: String,
    pub incident_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub display_order: i32,
    pub caption: Option<String>,
    pub uploaded_by_id: String,
    pub created_at: chrono::DateTime<Utc>,
}

/// File extension used in the storage path, or `None` when the content type is
/// not an accepted image type.
pub fn photo_extension(content_type: &str) -> Option<&'static str> {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/heif" => Some("heif"),
        _ => None,
    }
}

/// Renumbers photos to `0..len` keeping the relative order given by the
/// previous `(display_order, created_at)` key.
///
/// Returns `(photo id, new display_order)` for every photo that moved.
pub fn resequence(photos: &mut [Photo]) -> Vec<(ObjectId, i32)> {
    photos.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut changed: Vec<(ObjectId, i32)> = Vec::new();
    for (index, photo) in photos.iter_mut().enumerate() {
        let order = index as i32;
        if photo.display_order != order {
            photo.display_order = order;
            changed.push((photo._id, order));
        }
    }
    changed
}

impl Photo {
    pub fn is_pending(&self) -> bool {
        self.status == PhotoStatus::Pending
    }
    pub fn to_response(&self) -> PhotoResponse {
        PhotoResponse {
            _id: self._id.to_hex(),
            incident_id: self.incident_id.to_hex(),
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            size_bytes: self.size_bytes,
            display_order: self.display_order,
            caption: self.caption.clone(),
            uploaded_by_id: self.uploaded_by_id.to_hex(),
            created_at: self.created_at.to_chrono(),
        }
    }
}
