use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Resident {
    pub _id: ObjectId,
    pub home_id: ObjectId,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

impl Resident {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
