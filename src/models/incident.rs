use chrono::Utc;
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::photo::PhotoResponse;

pub const SEVERITY_MIN: i32 = 1;
pub const SEVERITY_MAX: i32 = 5;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Fall,
    Medication,
    Behavioral,
    Medical,
    Injury,
    Elopement,
    Other,
}
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Draft,
    Submitted,
    UnderReview,
    Closed,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Incident {
    pub _id: ObjectId,
    pub reference_number: String,
    pub resident_id: Option<ObjectId>,
    pub home_id: ObjectId,
    pub reported_by_id: ObjectId,
    pub kind: IncidentKind,
    pub severity: i32,
    pub occurred_at: DateTime,
    pub location: String,
    pub description: String,
    pub actions_taken: Option<String>,
    pub witness_names: Option<String>,
    pub notified_parties: Option<String>,
    pub status: IncidentStatus,
    pub closed_by_id: Option<ObjectId>,
    pub closed_at: Option<DateTime>,
    pub closure_notes: Option<String>,
    pub admin_notified_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct IncidentFollowUp {
    pub _id: ObjectId,
    pub incident_id: ObjectId,
    pub author_id: ObjectId,
    pub note: String,
    pub created_at: DateTime,
}
#[derive(Debug, Deserialize)]
pub struct IncidentRequest {
    pub resident_id: Option<String>,
    pub home_id: String,
    pub kind: IncidentKind,
    pub severity: i32,
    pub occurred_at: chrono::DateTime<Utc>,
    pub location: String,
    pub description: String,
    pub actions_taken: Option<String>,
    pub witness_names: Option<String>,
    pub notified_parties: Option<String>,
    #[serde(default)]
    pub submit: bool,
}
#[derive(Debug, Default, Deserialize)]
pub struct IncidentUpdateRequest {
    pub resident_id: Option<String>,
    pub kind: Option<IncidentKind>,
    pub severity: Option<i32>,
    pub occurred_at: Option<chrono::DateTime<Utc>>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub actions_taken: Option<String>,
    pub witness_names: Option<String>,
    pub notified_parties: Option<String>,
}
#[derive(Debug, Deserialize)]
pub struct IncidentStatusRequest {
    pub status: IncidentStatus,
    pub closure_notes: Option<String>,
}
#[derive(Debug, Deserialize)]
pub struct IncidentFollowUpRequest {
    pub note: String,
}
#[derive(Debug, Default, Deserialize)]
pub struct IncidentQueryParams {
    pub home_id: Option<String>,
    pub resident_id: Option<String>,
    pub status: Option<IncidentStatus>,
    pub kind: Option<IncidentKind>,
    pub occurred_from: Option<chrono::DateTime<Utc>>,
    pub occurred_to: Option<chrono::DateTime<Utc>>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}
#[derive(Clone, Debug)]
pub struct IncidentQuery {
    pub home_id: Option<ObjectId>,
    pub resident_id: Option<ObjectId>,
    pub status: Option<IncidentStatus>,
    pub kind: Option<IncidentKind>,
    pub occurred_from: Option<DateTime>,
    pub occurred_to: Option<DateTime>,
    pub skip: u64,
    pub limit: u64,
}
#[derive(Debug, Serialize)]
pub struct IncidentResponse {
    pub _id: String,
    pub reference_number: String,
    pub resident_id: Option<String>,
    pub home_id: String,
    pub reported_by_id: String,
    pub kind: IncidentKind,
    pub kind_label: &'static str,
    pub severity: i32,
    pub severity_label: &'static str,
    pub occurred_at: chrono::DateTime<Utc>,
    pub location: String,
    pub description: String,
    pub actions_taken: Option<String>,
    pub witness_names: Option<String>,
    pub notified_parties: Option<String>,
    pub status: IncidentStatus,
    pub closed_by_id: Option<String>,
    pub closed_at: Option<chrono::DateTime<Utc>>,
    pub closure_notes: Option<String>,
    pub admin_notified_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
    pub follow_ups: Vec<IncidentFollowUpResponse>,
    pub photos: Vec<PhotoResponse>,
}
#[derive(Debug, Serialize)]
pub struct IncidentSummaryResponse {
    pub _id: String,
    pub reference_number: String,
    pub resident_id: Option<String>,
    pub home_id: String,
    pub kind: IncidentKind,
    pub severity: i32,
    pub severity_label: &'static str,
    pub status: IncidentStatus,
    pub occurred_at: chrono::DateTime<Utc>,
    pub location: String,
}
#[derive(Debug, Serialize)]
pub struct IncidentPageResponse {
    pub items: Vec<IncidentSummaryResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}
#[derive(Debug, Serialize)]
pub struct IncidentFollowUpResponse {
    pub _id: String,
    pub author_id: String,
    pub note: String,
    pub created_at: chrono::DateTime<Utc>,
}
#[derive(Debug, Serialize)]
pub struct ReferenceValidationResponse {
    pub reference_number: String,
    pub valid: bool,
}

impl IncidentKind {
    /// Leading character of the reference number.
    pub fn code(&self) -> char {
        match self {
            IncidentKind::Fall => 'F',
            IncidentKind::Medication => 'M',
            IncidentKind::Behavioral => 'B',
            IncidentKind::Medical => 'X',
            IncidentKind::Injury => 'I',
            IncidentKind::Elopement => 'E',
            IncidentKind::Other => 'O',
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            IncidentKind::Fall => "Fall",
            IncidentKind::Medication => "Medication",
            IncidentKind::Behavioral => "Behavioral",
            IncidentKind::Medical => "Medical",
            IncidentKind::Injury => "Injury",
            IncidentKind::Elopement => "Elopement",
            IncidentKind::Other => "Other",
        }
    }
}

impl IncidentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            IncidentStatus::Draft => "draft",
            IncidentStatus::Submitted => "submitted",
            IncidentStatus::UnderReview => "under_review",
            IncidentStatus::Closed => "closed",
        }
    }
}

pub fn severity_label(severity: i32) -> &'static str {
    match severity {
        1 => "Minimal",
        2 => "Low",
        3 => "Moderate",
        4 => "High",
        5 => "Critical",
        _ => "Unknown",
    }
}

impl Incident {
    pub fn is_draft(&self) -> bool {
        self.status == IncidentStatus::Draft
    }
    pub fn is_reported_by(&self, actor_id: &ObjectId) -> bool {
        &self.reported_by_id == actor_id
    }
    pub fn to_summary(&self) -> IncidentSummaryResponse {
        IncidentSummaryResponse {
            _id: self._id.to_hex(),
            reference_number: self.reference_number.clone(),
            resident_id: self.resident_id.map(|id| id.to_hex()),
            home_id: self.home_id.to_hex(),
            kind: self.kind,
            severity: self.severity,
            severity_label: severity_label(self.severity),
            status: self.status,
            occurred_at: self.occurred_at.to_chrono(),
            location: self.location.clone(),
        }
    }
    pub fn to_response(
        &self,
        follow_ups: Vec<IncidentFollowUp>,
        photos: Vec<PhotoResponse>,
    ) -> IncidentResponse {
        IncidentResponse {
            _id: self._id.to_hex(),
            reference_number: self.reference_number.clone(),
            resident_id: self.resident_id.map(|id| id.to_hex()),
            home_id: self.home_id.to_hex(),
            reported_by_id: self.reported_by_id.to_hex(),
            kind: self.kind,
            kind_label: self.kind.label(),
            severity: self.severity,
            severity_label: severity_label(self.severity),
            occurred_at: self.occurred_at.to_chrono(),
            location: self.location.clone(),
            description: self.description.clone(),
            actions_taken: self.actions_taken.clone(),
            witness_names: self.witness_names.clone(),
            notified_parties: self.notified_parties.clone(),
            status: self.status,
            closed_by_id: self.closed_by_id.map(|id| id.to_hex()),
            closed_at: self.closed_at.map(|time| time.to_chrono()),
            closure_notes: self.closure_notes.clone(),
            admin_notified_at: self.admin_notified_at.map(|time| time.to_chrono()),
            created_at: self.created_at.to_chrono(),
            updated_at: self.updated_at.to_chrono(),
            follow_ups: follow_ups.iter().map(IncidentFollowUp::to_response).collect(),
            photos,
        }
    }
}

impl IncidentFollowUp {
    pub fn to_response(&self) -> IncidentFollowUpResponse {
        IncidentFollowUpResponse {
            _id: self._id.to_hex(),
            author_id: self.author_id.to_hex(),
            note: self.note.clone(),
            created_at: self.created_at.to_chrono(),
        }
    }
}
