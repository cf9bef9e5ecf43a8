use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Facility record. Owned by the platform's home management, read here for
/// validation and reference-number ranking.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Home {
    pub _id: ObjectId,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime,
}
