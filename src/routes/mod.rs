use actix_web::{web, HttpMessage, HttpRequest};
use mongodb::bson::oid::ObjectId;

use crate::models::actor::ActorAuthentication;

pub mod blob;
pub mod incident;
pub mod photo;

/// The actor the authentication middleware attached to the request, if any.
pub fn authenticated(req: &HttpRequest) -> Option<ActorAuthentication> {
    req.extensions().get::<ActorAuthentication>().cloned()
}

pub fn parse_ids(ids: &[&str]) -> Option<Vec<ObjectId>> {
    ids.iter().map(|id| id.parse().ok()).collect()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(incident::create_incident)
        .service(incident::get_incidents)
        .service(incident::get_incident)
        .service(incident::update_incident)
        .service(incident::delete_incident)
        .service(incident::submit_incident)
        .service(incident::update_incident_status)
        .service(incident::create_incident_follow_up)
        .service(incident::get_incident_by_reference)
        .service(incident::validate_incident_reference)
        .service(photo::create_incident_photo)
        .service(photo::get_incident_photos)
        .service(photo::confirm_incident_photo)
        .service(photo::cancel_incident_photo)
        .service(photo::get_incident_photo_url)
        .service(photo::delete_incident_photo)
        .service(blob::put_blob)
        .service(blob::get_blob);
}
