use actix_web::{delete, get, post, web, HttpRequest, HttpResponse, ResponseError};

use super::{authenticated, parse_ids};
use crate::{incident::lifecycle::IncidentLifecycleManager, models::photo::PhotoUploadRequest};

#[post("/incidents/{incident_id}/photos")]
pub async fn create_incident_photo(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    payload: web::Json<PhotoUploadRequest>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager
        .attachments()
        .initiate(&actor, &incident_id, payload.into_inner())
        .await
    {
        Ok(upload) => HttpResponse::Created().json(upload),
        Err(error) => error.error_response(),
    }
}
#[get("/incidents/{incident_id}/photos")]
pub async fn get_incident_photos(
    manager: web::Data<IncidentLifecycleManager>,
    incident_id: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let incident_id = match incident_id.parse() {
        Ok(incident_id) => incident_id,
        Err(_) => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.attachments().list(&actor, &incident_id).await {
        Ok(photos) => HttpResponse::Ok().json(photos),
        Err(error) => error.error_response(),
    }
}
#[post("/incidents/{incident_id}/photos/{photo_id}/confirm")]
pub async fn confirm_incident_photo(
    manager: web::Data<IncidentLifecycleManager>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let (incident_id, photo_id) = path.into_inner();
    let ids = match parse_ids(&[&incident_id, &photo_id]) {
        Some(ids) => ids,
        None => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.attachments().confirm(&actor, &ids[0], &ids[1]).await {
        Ok(photo) => HttpResponse::Ok().json(photo),
        Err(error) => error.error_response(),
    }
}
#[post("/incidents/{incident_id}/photos/{photo_id}/cancel")]
pub async fn cancel_incident_photo(
    manager: web::Data<IncidentLifecycleManager>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let (incident_id, photo_id) = path.into_inner();
    let ids = match parse_ids(&[&incident_id, &photo_id]) {
        Some(ids) => ids,
        None => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.attachments().cancel(&actor, &ids[0], &ids[1]).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => error.error_response(),
    }
}
#[get("/incidents/{incident_id}/photos/{photo_id}/url")]
pub async fn get_incident_photo_url(
    manager: web::Data<IncidentLifecycleManager>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let (incident_id, photo_id) = path.into_inner();
    let ids = match parse_ids(&[&incident_id, &photo_id]) {
        Some(ids) => ids,
        None => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.attachments().view_url(&actor, &ids[0], &ids[1]).await {
        Ok(view) => HttpResponse::Ok().json(view),
        Err(error) => error.error_response(),
    }
}
#[delete("/incidents/{incident_id}/photos/{photo_id}")]
pub async fn delete_incident_photo(
    manager: web::Data<IncidentLifecycleManager>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let actor = match authenticated(&req) {
        Some(actor) => actor,
        None => return HttpResponse::Unauthorized().body("UNAUTHORIZED"),
    };
    let (incident_id, photo_id) = path.into_inner();
    let ids = match parse_ids(&[&incident_id, &photo_id]) {
        Some(ids) => ids,
        None => return HttpResponse::BadRequest().body("INVALID_ID"),
    };

    match manager.attachments().delete(&actor, &ids[0], &ids[1]).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(error) => error.error_response(),
    }
}
